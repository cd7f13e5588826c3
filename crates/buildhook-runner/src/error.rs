//! Error types for launching builds.
//!
//! Only launch problems are errors. A build that fails, is killed or times
//! out is reported in-band through its exit-status frame.

use thiserror::Error;

/// Result type alias for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Failures that prevent a build from starting.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The OS refused to start the process (E2001).
    #[error("[E2001] Failed to spawn {program}: {source}")]
    Spawn {
        /// Program that was being started
        program: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// A piped stdio handle was not available after spawning (E2002).
    #[error("[E2002] Child process has no {0} pipe")]
    MissingPipe(&'static str),
}

impl RunnerError {
    /// Returns the error code (E2001-E2002).
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "E2001",
            Self::MissingPipe(_) => "E2002",
        }
    }
}
