//! Frames emitted by a running build and exit-status reporting.

use std::{fmt, process::ExitStatus, time::Duration};

/// Marks the logical end of a build stream.
///
/// Lets a consumer tell "build finished" apart from "connection dropped".
pub const DONE_SENTINEL: &str = "__done__";

/// One unit of streamed build output.
///
/// Text frames are stored trimmed and are never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Echo of the command line, always first.
    Command(String),
    /// A line the process wrote to stdout or stderr.
    Output(String),
    /// How the process ended.
    Status(ExitReport),
    /// End-of-build sentinel, always last.
    Done,
}

impl Frame {
    /// Builds the command echo frame (`$ program args...`).
    pub fn command(command_line: &str) -> Option<Self> {
        non_empty(&format!("$ {command_line}")).map(Self::Command)
    }

    /// Builds an output frame, or `None` if the line is blank.
    pub fn output(line: &str) -> Option<Self> {
        non_empty(line).map(Self::Output)
    }

    /// Splits raw process output into output frames.
    ///
    /// Carriage returns (progress bars, spinners) start a new frame, same as
    /// newlines. Blank segments are dropped.
    pub fn output_lines(raw: &str) -> impl Iterator<Item = Self> + '_ {
        raw.split(['\r', '\n']).filter_map(Self::output)
    }

    /// Text carried on the wire.
    pub fn text(&self) -> String {
        self.to_string()
    }

    /// Whether this is the end-of-build sentinel.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(text) | Self::Output(text) => f.write_str(text),
            Self::Status(report) => write!(f, "{report}"),
            Self::Done => f.write_str(DONE_SENTINEL),
        }
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// How a build process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReport {
    /// Normal exit with a status code.
    Exited {
        /// Exit code
        code: i32,
    },
    /// Terminated by a signal it did not handle.
    Signaled {
        /// Signal number
        signal: i32,
    },
    /// Killed by the supervisor after the timeout elapsed.
    TimedOut {
        /// Configured timeout
        after: Duration,
    },
    /// Status could not be determined.
    Unknown,
}

impl ExitReport {
    /// Converts an OS exit status.
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Exited { code };
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signaled { signal };
            }
        }
        Self::Unknown
    }

    /// Whether the build succeeded.
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited { code: 0 })
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited { code } => match exit_code_meaning(*code) {
                Some(meaning) => write!(f, "exited with code {code} ({meaning})"),
                None => write!(f, "exited with code {code}"),
            },
            Self::Signaled { signal } => write!(f, "terminated by signal {signal}"),
            Self::TimedOut { after } => {
                write!(f, "killed after exceeding timeout of {}s", after.as_secs())
            },
            Self::Unknown => f.write_str("exited with unknown status"),
        }
    }
}

/// Conventional meanings for the exit codes shells and build tools use.
fn exit_code_meaning(code: i32) -> Option<&'static str> {
    match code {
        0 => Some("OK"),
        1 => Some("General error"),
        2 => Some("Misuse of shell builtins"),
        126 => Some("Invoked command cannot execute"),
        127 => Some("Command not found"),
        128 => Some("Invalid exit argument"),
        130 => Some("Interrupt"),
        _ => None,
    }
}
