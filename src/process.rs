use crate::encoding::OutputEncoding;
use crate::error::{CmdError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wait_timeout::ChildExt;

mod drain;

use drain::{Drain, Stream};

/// How long a synchronous execution may take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    #[default]
    Infinite,
    Seconds(u64),
}

impl Timeout {
    /// Negative values mean "wait forever", as `-1` does in the request contract
    pub fn from_seconds(seconds: i64) -> Self {
        u64::try_from(seconds)
            .map(Timeout::Seconds)
            .unwrap_or(Timeout::Infinite)
    }

    pub fn as_duration(self) -> Option<Duration> {
        match self {
            Timeout::Infinite => None,
            Timeout::Seconds(seconds) => Some(Duration::from_secs(seconds)),
        }
    }

    fn seconds(self) -> u64 {
        match self {
            Timeout::Infinite => u64::MAX,
            Timeout::Seconds(seconds) => seconds,
        }
    }
}

impl FromStr for Timeout {
    type Err = CmdError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("infinite") {
            return Ok(Timeout::Infinite);
        }
        s.parse::<i64>()
            .map(Timeout::from_seconds)
            .map_err(|_| CmdError::InvalidArguments(format!("invalid timeout: {}", s)))
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeout::Infinite => f.write_str("infinite"),
            Timeout::Seconds(seconds) => write!(f, "{}s", seconds),
        }
    }
}

/// Terminal outcome of [`ProcessRunner::execute_async`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncOutcome {
    Exited(i32),
    Cancelled,
}

enum Running {
    Blocking(Child),
    Async(tokio::process::Child),
}

enum State {
    Created,
    Running(Running),
    Exited(i32),
    Cancelled,
}

/// Owns one child-process invocation from start to disposal.
///
/// The runner is single-use: it starts its process at most once. Output text
/// is only exposed after the corresponding pipe was fully drained.
///
/// Dropping a runner disposes it, which kills a child that is still running.
pub struct ProcessRunner {
    program: PathBuf,
    command_line: String,
    working_dir: Option<PathBuf>,
    encoding: OutputEncoding,
    state: State,
    stdout: Drain,
    stderr: Drain,
    disposed: bool,
}

impl ProcessRunner {
    /// Prepare an invocation of `program` with an already escaped command line
    ///
    /// # Arguments
    /// * `program` - Path of the executable; its directory becomes the working directory
    /// * `command_line` - Arguments rendered as one command-line string
    pub fn new(program: impl AsRef<Path>, command_line: impl Into<String>) -> Result<Self> {
        let raw = program.as_ref().to_string_lossy();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CmdError::InvalidArguments(
                "No executable specified".to_string(),
            ));
        }

        let program = PathBuf::from(trimmed);
        let working_dir = program
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf);

        Ok(Self {
            program,
            command_line: command_line.into(),
            working_dir,
            encoding: OutputEncoding::default(),
            state: State::Created,
            stdout: Drain::idle(Stream::Stdout),
            stderr: Drain::idle(Stream::Stderr),
            disposed: false,
        })
    }

    /// Decode output with `encoding` instead of UTF-8
    pub fn with_encoding(mut self, encoding: OutputEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// OS process id while the child is running
    pub fn id(&self) -> Option<u32> {
        match &self.state {
            State::Running(Running::Blocking(child)) => Some(child.id()),
            State::Running(Running::Async(child)) => child.id(),
            _ => None,
        }
    }

    /// Captured standard output, once fully drained
    pub fn stdout(&self) -> Option<&str> {
        self.stdout.text()
    }

    /// Captured standard error, once fully drained
    pub fn stderr(&self) -> Option<&str> {
        self.stderr.text()
    }

    /// Check whether the child has exited without blocking
    pub fn has_exited(&mut self) -> Result<bool> {
        match &mut self.state {
            State::Created => Ok(false),
            State::Running(Running::Blocking(child)) => Ok(child.try_wait()?.is_some()),
            State::Running(Running::Async(child)) => Ok(child.try_wait()?.is_some()),
            State::Exited(_) | State::Cancelled => Ok(true),
        }
    }

    /// Start the child for blocking execution with both drains listening
    pub fn start(&mut self) -> Result<()> {
        self.ensure_startable()?;

        let mut child = self.command().spawn().map_err(|source| self.launch_error(source))?;
        tracing::debug!(program = %self.program.display(), pid = child.id(), "started child process");

        let started = self
            .stdout
            .spawn_thread(child.stdout.take(), self.encoding)
            .and_then(|_| self.stderr.spawn_thread(child.stderr.take(), self.encoding));
        if let Err(e) = started {
            kill_blocking(&mut child);
            return Err(e);
        }

        self.state = State::Running(Running::Blocking(child));
        Ok(())
    }

    /// Run the child to completion, blocking the current thread.
    ///
    /// Starts the process if needed, then waits until it exited and both
    /// output pipes were drained, or `timeout` elapsed. On timeout the child is
    /// left running; call `execute` again to keep waiting, or dispose to kill it.
    ///
    /// # Returns
    /// The child's exit code
    pub fn execute(&mut self, timeout: Timeout) -> Result<i32> {
        if self.disposed {
            return Err(CmdError::InvalidState("process runner was disposed"));
        }
        match self.state {
            State::Created => self.start()?,
            State::Running(Running::Blocking(_)) => {}
            State::Exited(code) => return Ok(code),
            State::Running(Running::Async(_)) => {
                return Err(CmdError::InvalidState("process was started asynchronously"))
            }
            State::Cancelled => return Err(CmdError::InvalidState("process was cancelled")),
        }

        // A deadline past the clock's range waits like `Infinite`
        let deadline = timeout
            .as_duration()
            .and_then(|limit| Instant::now().checked_add(limit));

        let State::Running(Running::Blocking(child)) = &mut self.state else {
            return Err(CmdError::InvalidState("process is not running"));
        };

        let status = match deadline {
            None => Some(child.wait()?),
            Some(deadline) => {
                child.wait_timeout(deadline.saturating_duration_since(Instant::now()))?
            }
        };

        let drained = match status {
            Some(_) => self.stdout.wait_blocking(deadline)? && self.stderr.wait_blocking(deadline)?,
            None => false,
        };

        match status {
            Some(status) if drained => {
                let code = exit_code(status);
                tracing::info!(program = %self.program.display(), code, "child process exited");
                self.state = State::Exited(code);
                Ok(code)
            }
            _ => {
                tracing::warn!(program = %self.program.display(), %timeout, "child process timed out");
                Err(CmdError::Timeout {
                    program: self.program.clone(),
                    seconds: timeout.seconds(),
                })
            }
        }
    }

    /// Run the child to completion without blocking a thread.
    ///
    /// A token that is already cancelled completes as `Cancelled` without
    /// spawning anything. Cancellation after start kills the child, unless it
    /// has already exited on its own, in which case its exit code is returned.
    pub async fn execute_async(&mut self, cancel: &CancellationToken) -> Result<AsyncOutcome> {
        self.ensure_startable()?;

        if cancel.is_cancelled() {
            tracing::debug!(program = %self.program.display(), "cancelled before start");
            self.state = State::Cancelled;
            return Ok(AsyncOutcome::Cancelled);
        }

        let mut command = tokio::process::Command::from(self.command());
        command.kill_on_drop(true);
        let mut child = command.spawn().map_err(|source| self.launch_error(source))?;
        tracing::debug!(program = %self.program.display(), pid = ?child.id(), "started child process");

        self.stdout.spawn_task(child.stdout.take(), self.encoding);
        self.stderr.spawn_task(child.stderr.take(), self.encoding);
        self.state = State::Running(Running::Async(child));

        let State::Running(Running::Async(child)) = &mut self.state else {
            return Err(CmdError::InvalidState("process is not running"));
        };

        let natural = tokio::select! {
            biased;
            status = child.wait() => Some(status?),
            _ = cancel.cancelled() => None,
        };

        let outcome = match natural {
            Some(status) => AsyncOutcome::Exited(exit_code(status)),
            None => match child.try_wait()? {
                Some(status) => AsyncOutcome::Exited(exit_code(status)),
                None => {
                    tracing::info!(program = %self.program.display(), "cancellation requested, killing child");
                    if let Some(pid) = child.id() {
                        kill_process_group(pid);
                    }
                    child.start_kill()?;
                    child.wait().await?;
                    AsyncOutcome::Cancelled
                }
            },
        };

        self.stdout.wait_async().await?;
        self.stderr.wait_async().await?;

        self.state = match outcome {
            AsyncOutcome::Exited(code) => {
                tracing::info!(program = %self.program.display(), code, "child process exited");
                State::Exited(code)
            }
            AsyncOutcome::Cancelled => State::Cancelled,
        };
        Ok(outcome)
    }

    /// Kill the child if it is still running and release its resources.
    ///
    /// Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        match &mut self.state {
            State::Running(Running::Blocking(child)) => {
                kill_process_group(child.id());
                if matches!(child.try_wait(), Ok(None)) {
                    tracing::warn!(program = %self.program.display(), pid = child.id(), "killing child process");
                    kill_blocking(child);
                }
            }
            State::Running(Running::Async(child)) => {
                if let Some(pid) = child.id() {
                    kill_process_group(pid);
                }
                if matches!(child.try_wait(), Ok(None)) {
                    tracing::warn!(program = %self.program.display(), pid = ?child.id(), "killing child process");
                    // Reaped by the runtime once the kill lands
                    let _ = child.start_kill();
                }
            }
            _ => {}
        }

        self.stdout.detach();
        self.stderr.detach();
    }

    fn ensure_startable(&self) -> Result<()> {
        if self.disposed {
            return Err(CmdError::InvalidState("process runner was disposed"));
        }
        match self.state {
            State::Created => Ok(()),
            _ => Err(CmdError::InvalidState("process was already started")),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        apply_command_line(&mut command, &self.command_line);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        // Own group, so a kill also reaches grandchildren holding the pipes
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    fn launch_error(&self, source: std::io::Error) -> CmdError {
        tracing::error!(program = %self.program.display(), error = %source, "failed to start child process");
        CmdError::Launch {
            program: self.program.clone(),
            source,
        }
    }
}

impl Drop for ProcessRunner {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("program", &self.program)
            .field("command_line", &self.command_line)
            .field("encoding", &self.encoding)
            .field("pid", &self.id())
            .field("disposed", &self.disposed)
            .finish()
    }
}

#[cfg(windows)]
fn apply_command_line(command: &mut Command, command_line: &str) {
    use std::os::windows::process::CommandExt;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(CREATE_NO_WINDOW);
    if !command_line.trim().is_empty() {
        command.raw_arg(command_line);
    }
}

#[cfg(not(windows))]
fn apply_command_line(command: &mut Command, command_line: &str) {
    command.args(crate::argv::split_exe(command_line));
}

/// SIGKILL every process in the group led by `pid`
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        tracing::debug!(pid, error = %e, "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

fn kill_blocking(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::debug!(error = %e, "kill failed; child already gone");
    }
    let _ = child.wait();
}

/// Exit code of a finished child; death by signal reports `128 + signo`
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            match nix::sys::signal::Signal::try_from(signal) {
                Ok(name) => tracing::debug!(signal = name.as_str(), "child terminated by signal"),
                Err(_) => tracing::debug!(signal, "child terminated by unknown signal"),
            }
            return 128 + signal;
        }
    }

    -1
}
