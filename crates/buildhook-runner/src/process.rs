//! Subprocess supervision.
//!
//! `stream_process` spawns the child and hands it to a supervising task
//! that forwards merged stdout/stderr lines over a bounded channel. The
//! supervisor owns the child until it has been reaped.
//!
//! On unix the child leads its own process group, and a kill signals the
//! whole group so that helpers it started (composer, git) go with it.

use std::{
    io,
    path::{Path, PathBuf},
    pin::Pin,
    process::Stdio,
    task::{Context, Poll},
    time::Duration,
};

use futures::Stream;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    sync::mpsc,
    time::Instant,
};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    environment::BuildEnvironment,
    error::{Result, RunnerError},
    frame::{ExitReport, Frame},
};

/// Frames buffered between the supervisor and a slow consumer.
const FRAME_BUFFER: usize = 16;

/// What to run and under which constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    program: PathBuf,
    args: Vec<String>,
    work_dir: Option<PathBuf>,
    env: Option<BuildEnvironment>,
    timeout: Option<Duration>,
}

impl ProcessSpec {
    /// Runs `program` with no arguments, inheriting cwd and environment.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), work_dir: None, env: None, timeout: None }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Working directory of the child.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Replaces the inherited environment entirely.
    pub fn env(mut self, env: BuildEnvironment) -> Self {
        self.env = Some(env);
        self
    }

    /// Kills the child once `timeout` has elapsed.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Program path.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments, in order.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if set.
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    /// Environment override, if set.
    pub fn environment(&self) -> Option<&BuildEnvironment> {
        self.env.as_ref()
    }

    /// Timeout, if set.
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout
    }

    /// Human-readable command line echoed as the first frame.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Live output of a supervised process.
///
/// Ends after [`Frame::Done`]. Dropping the stream kills the child.
#[derive(Debug)]
pub struct FrameStream {
    frames: mpsc::Receiver<Frame>,
    pid: Option<u32>,
}

impl FrameStream {
    /// OS process id of the child.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Waits for the next frame.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }
}

impl Stream for FrameStream {
    type Item = Frame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        self.frames.poll_recv(cx)
    }
}

/// Spawns `spec` and returns its output stream.
///
/// Must be called from within a tokio runtime. Fails only if the process
/// cannot be started; everything after that is reported in-band.
pub fn stream_process(spec: ProcessSpec) -> Result<FrameStream> {
    let command_line = spec.command_line();
    let ProcessSpec { program, args, work_dir, env, timeout } = spec;

    let mut command = Command::new(&program);
    command
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);
    if let Some(dir) = &work_dir {
        command.current_dir(dir);
    }
    if let Some(env) = env {
        command.env_clear().envs(env.into_map());
    }

    let mut child = command
        .spawn()
        .map_err(|source| RunnerError::Spawn { program: program.display().to_string(), source })?;
    let stdout = child.stdout.take().ok_or(RunnerError::MissingPipe("stdout"))?;
    let stderr = child.stderr.take().ok_or(RunnerError::MissingPipe("stderr"))?;
    let pid = child.id();
    let deadline = timeout.map(|timeout| Instant::now() + timeout);

    info!(pid, command = %command_line, "build process started");

    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    let supervisor = Supervisor {
        child,
        stdout: LineReader::new(stdout),
        stderr: LineReader::new(stderr),
        timeout,
        deadline,
        frames: tx,
    };
    tokio::spawn(supervisor.run(command_line).instrument(info_span!("build", pid)));

    Ok(FrameStream { frames: rx, pid })
}

struct Supervisor<O, E> {
    child: Child,
    stdout: LineReader<O>,
    stderr: LineReader<E>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    frames: mpsc::Sender<Frame>,
}

/// Outcome of handing one line to the consumer.
enum Forwarded {
    Sent,
    Closed,
    Expired,
}

impl<O, E> Supervisor<O, E>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    async fn run(mut self, command_line: String) {
        if let Some(frame) = Frame::command(&command_line) {
            if self.frames.send(frame).await.is_err() {
                return self.abandon().await;
            }
        }

        let timeout = self.timeout;
        let deadline = expire(self.deadline);
        tokio::pin!(deadline);

        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut timed_out = false;

        while stdout_open || stderr_open {
            tokio::select! {
                line = self.stdout.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => match self.forward(&line).await {
                        Forwarded::Sent => {},
                        Forwarded::Closed => return self.abandon().await,
                        Forwarded::Expired => {
                            timed_out = true;
                            break;
                        },
                    },
                    Ok(None) => stdout_open = false,
                    Err(error) => {
                        warn!(%error, "failed to read stdout");
                        stdout_open = false;
                    },
                },
                line = self.stderr.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => match self.forward(&line).await {
                        Forwarded::Sent => {},
                        Forwarded::Closed => return self.abandon().await,
                        Forwarded::Expired => {
                            timed_out = true;
                            break;
                        },
                    },
                    Ok(None) => stderr_open = false,
                    Err(error) => {
                        warn!(%error, "failed to read stderr");
                        stderr_open = false;
                    },
                },
                () = &mut deadline => {
                    timed_out = true;
                    break;
                },
                () = self.frames.closed() => return self.abandon().await,
            }
        }

        let report = if timed_out {
            self.kill_for_timeout(timeout).await
        } else {
            tokio::select! {
                status = self.child.wait() => match status {
                    Ok(status) => ExitReport::from_status(status),
                    Err(error) => {
                        warn!(%error, "failed to wait for build process");
                        ExitReport::Unknown
                    },
                },
                () = &mut deadline => self.kill_for_timeout(timeout).await,
                () = self.frames.closed() => return self.abandon().await,
            }
        };

        if report.success() {
            info!(%report, "build process finished");
        } else {
            warn!(%report, "build process failed");
        }

        if self.frames.send(Frame::Status(report)).await.is_ok() {
            let _ = self.frames.send(Frame::Done).await;
        }
    }

    /// Sends every frame in `line`.
    ///
    /// A consumer that stops reading must not hold the deadline off, so each
    /// send races it.
    async fn forward(&self, line: &str) -> Forwarded {
        for frame in Frame::output_lines(line) {
            tokio::select! {
                sent = self.frames.send(frame) => {
                    if sent.is_err() {
                        return Forwarded::Closed;
                    }
                },
                () = expire(self.deadline) => return Forwarded::Expired,
            }
        }
        Forwarded::Sent
    }

    async fn kill_for_timeout(&mut self, timeout: Option<Duration>) -> ExitReport {
        let after = timeout.unwrap_or_default();
        warn!(timeout_secs = after.as_secs(), "build process exceeded timeout, killing");
        self.kill_and_reap().await;
        ExitReport::TimedOut { after }
    }

    async fn abandon(mut self) {
        debug!("consumer disconnected, killing build process");
        self.kill_and_reap().await;
    }

    async fn kill_and_reap(&mut self) {
        #[cfg(unix)]
        if let Some(leader) = self.child.id() {
            kill_process_group(leader).await;
        }
        if let Err(error) = self.child.start_kill() {
            debug!(%error, "kill failed, process already exited");
        }
        if let Err(error) = self.child.wait().await {
            warn!(%error, "failed to reap build process");
        }
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Sends SIGKILL to every process in the group led by `leader`.
///
/// The leader must not have been reaped yet, otherwise its id may already
/// belong to an unrelated group.
#[cfg(unix)]
async fn kill_process_group(leader: u32) {
    let status = Command::new("/bin/sh")
        .arg("-c")
        .arg(format!("kill -9 -{leader}"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) if status.success() => debug!(leader, "killed build process group"),
        Ok(status) => debug!(leader, %status, "process group already gone"),
        Err(error) => warn!(leader, %error, "failed to signal build process group"),
    }
}

/// Newline-delimited reader that survives cancellation.
///
/// Partial lines stay in `buf` when a `select!` branch loses, so no output
/// is dropped. Invalid UTF-8 is replaced rather than rejected.
struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R) -> Self {
        Self { reader: BufReader::new(inner), buf: Vec::new() }
    }

    async fn next_line(&mut self) -> io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_joins_program_and_args() {
        let spec = ProcessSpec::new("/srv/satis/bin/satis").arg("build").args(["satis.json", "-v"]);
        assert_eq!(spec.command_line(), "/srv/satis/bin/satis build satis.json -v");
    }

    #[test]
    fn defaults_inherit_everything() {
        let spec = ProcessSpec::new("true");
        assert!(spec.work_dir().is_none());
        assert!(spec.environment().is_none());
        assert!(spec.timeout_duration().is_none());
        assert!(spec.arguments().is_empty());
    }

    #[tokio::test]
    async fn line_reader_keeps_unterminated_tail() {
        let mut reader = LineReader::new(&b"first\nsecond"[..]);

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("first\n"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn line_reader_replaces_invalid_utf8() {
        let mut reader = LineReader::new(&b"caf\xff\n"[..]);

        let line = reader.next_line().await.unwrap().unwrap();

        assert_eq!(line, "caf\u{fffd}\n");
    }

    #[tokio::test]
    async fn expire_without_timeout_never_fires() {
        let fired = tokio::time::timeout(Duration::from_millis(20), expire(None)).await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn expire_fires_at_the_deadline() {
        let deadline = Instant::now();
        let fired = tokio::time::timeout(Duration::from_millis(500), expire(Some(deadline))).await;
        assert!(fired.is_ok());
    }
}
