//! Build subprocess supervision with live, framed output.
//!
//! A build is described by a `ProcessSpec`, launched by `stream_process`,
//! and observed as a `FrameStream`: the echoed command line, every output
//! line as it is produced, a final exit-status line and an end-of-build
//! sentinel. The supervising task owns the child for its whole life and
//! always reaps it, whether the build finishes, times out or the consumer
//! goes away.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod build;
pub mod environment;
pub mod error;
pub mod frame;
pub mod process;

pub use build::{SatisBuild, SATIS_FLAGS};
pub use environment::BuildEnvironment;
pub use error::{Result, RunnerError};
pub use frame::{ExitReport, Frame, DONE_SENTINEL};
pub use process::{stream_process, FrameStream, ProcessSpec};
