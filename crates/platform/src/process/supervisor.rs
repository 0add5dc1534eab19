//! Supervised execution of native commit processes
//!
//! The child writes structured status lines to [`STATUS_FD`]. The supervisor
//! reads them together with stdout and stderr, answers conffile prompts,
//! and interrupts the child when the status channel stays silent for longer
//! than the inactivity timeout.

use super::PlatformCommand;
use crate::status::{parse_status_line, StatusLine};
use pkgd_config::SupervisorConfig;
use pkgd_errors::SupervisorError;
use std::os::fd::{AsRawFd, OwnedFd};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Descriptor number the child sees its status channel on
pub const STATUS_FD: i32 = 3;

/// How long buffered output is still collected after the child exits
const DRAIN_WINDOW: Duration = Duration::from_millis(500);

/// Answer sent to a conffile prompt: the prompt's default, keep the current file
const KEEP_DEFAULT_ANSWER: &[u8] = b"\n";

/// Tunables for one supervised process
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub inactivity_timeout: Duration,
    pub poll_interval: Duration,
    pub terminate_grace: Duration,
    pub output_limit: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from(&SupervisorConfig::default())
    }
}

impl From<&SupervisorConfig> for SupervisorSettings {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            inactivity_timeout: config.inactivity_timeout(),
            poll_interval: config.poll_interval(),
            terminate_grace: config.terminate_grace(),
            output_limit: config.output_limit_bytes,
        }
    }
}

/// Lifecycle of a supervised child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Running,
    Exited(Option<i32>),
    /// Interrupted after the inactivity timeout
    Killed,
    /// Stopped through [`SupervisedProcess::terminate`]
    Terminated,
}

/// Result of one bounded [`SupervisedProcess::poll`]
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// Nothing happened within the poll interval
    Idle,
    /// Output or an unparseable status line arrived
    Active,
    Status(StatusLine),
    Exited(Option<i32>),
    Killed,
}

#[derive(Debug)]
enum StreamItem {
    Status(String),
    Output(String),
}

/// Starts supervised children
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor {
    settings: SupervisorSettings,
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new(settings: SupervisorSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Launch `cmd` with its status channel on [`STATUS_FD`].
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::SpawnFailed` if the status pipe cannot be
    /// created or the executable cannot be launched.
    pub fn start(&self, cmd: &PlatformCommand) -> Result<SupervisedProcess, SupervisorError> {
        let spawn_failed = |e: &std::io::Error| SupervisorError::SpawnFailed {
            command: cmd.to_string(),
            message: e.to_string(),
        };

        let (status_reader, status_writer) = std::io::pipe().map_err(|e| spawn_failed(&e))?;

        let mut command = Command::new(cmd.program());
        command
            .args(cmd.get_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cmd.get_current_dir() {
            command.current_dir(dir);
        }
        for (key, value) in cmd.get_env_vars() {
            command.env(key, value);
        }
        attach_status_fd(&mut command, status_writer.as_raw_fd());

        let mut child = command.spawn().map_err(|e| spawn_failed(&e))?;
        // The parent's copy must go away or the channel never reports EOF
        drop(status_writer);

        let receiver =
            tokio::net::unix::pipe::Receiver::from_owned_fd(OwnedFd::from(status_reader))
                .map_err(|e| spawn_failed(&e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut readers = vec![spawn_reader(receiver, tx.clone(), StreamItem::Status)];
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, tx.clone(), StreamItem::Output));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, tx, StreamItem::Output));
        }

        debug!(command = %cmd, pid = ?child.id(), "started supervised process");

        Ok(SupervisedProcess {
            command: cmd.to_string(),
            stdin: child.stdin.take(),
            child,
            rx,
            readers,
            streams_closed: false,
            settings: self.settings.clone(),
            last_activity: Instant::now(),
            exit: None,
            state: SupervisorState::Running,
            output: String::new(),
            conffile_prompts: Vec::new(),
            package_errors: Vec::new(),
        })
    }
}

#[allow(unsafe_code)]
fn attach_status_fd(command: &mut Command, fd: i32) {
    // SAFETY: the closure runs between fork and exec and only calls the
    // async-signal-safe fcntl(2) and dup2(2).
    unsafe {
        command.pre_exec(move || {
            if fd == STATUS_FD {
                let flags = libc::fcntl(fd, libc::F_GETFD);
                if flags < 0 || libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0 {
                    return Err(std::io::Error::last_os_error());
                }
            } else if libc::dup2(fd, STATUS_FD) < 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[allow(unsafe_code)]
fn send_signal(pid: u32, signal: libc::c_int) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| std::io::Error::other(format!("pid {pid} out of range")))?;
    // SAFETY: kill(2) takes plain integers and has no memory-safety requirements.
    let rc = unsafe { libc::kill(pid, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

fn spawn_reader<R>(
    source: R,
    tx: mpsc::UnboundedSender<StreamItem>,
    wrap: fn(String) -> StreamItem,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(source);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    if tx.send(wrap(line)).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// A running native command under supervision.
///
/// Dropping it kills and reaps the child.
#[derive(Debug)]
pub struct SupervisedProcess {
    command: String,
    child: Child,
    stdin: Option<ChildStdin>,
    rx: mpsc::UnboundedReceiver<StreamItem>,
    readers: Vec<JoinHandle<()>>,
    streams_closed: bool,
    settings: SupervisorSettings,
    last_activity: Instant,
    exit: Option<(Option<i32>, Instant)>,
    state: SupervisorState,
    output: String,
    conffile_prompts: Vec<String>,
    package_errors: Vec<(String, String)>,
}

impl SupervisedProcess {
    /// Wait at most one poll interval for something to happen.
    ///
    /// Once the process reached a terminal state every further call returns
    /// that state again.
    pub async fn poll(&mut self) -> PollEvent {
        match self.state {
            SupervisorState::Running => {}
            SupervisorState::Exited(code) => return PollEvent::Exited(code),
            SupervisorState::Killed => return PollEvent::Killed,
            SupervisorState::Terminated => return PollEvent::Exited(None),
        }

        if self.exit.is_none() {
            match self.child.try_wait() {
                Ok(Some(status)) => self.exit = Some((status.code(), Instant::now())),
                Ok(None) => {}
                Err(e) => warn!(command = %self.command, error = %e, "failed to query child status"),
            }
        }

        let wait = if let Some((code, seen)) = self.exit {
            if self.streams_closed || seen.elapsed() >= DRAIN_WINDOW {
                self.finish(SupervisorState::Exited(code));
                debug!(command = %self.command, ?code, "supervised process exited");
                return PollEvent::Exited(code);
            }
            self.settings.poll_interval.min(DRAIN_WINDOW)
        } else {
            let silent = self.last_activity.elapsed();
            if silent >= self.settings.inactivity_timeout {
                self.kill_for_inactivity().await;
                return PollEvent::Killed;
            }
            self.settings
                .poll_interval
                .min(self.settings.inactivity_timeout - silent)
        };

        tokio::select! {
            item = self.rx.recv(), if !self.streams_closed => match item {
                Some(item) => self.handle(item).await,
                None => {
                    self.streams_closed = true;
                    PollEvent::Idle
                }
            },
            () = tokio::time::sleep(wait) => PollEvent::Idle,
        }
    }

    async fn handle(&mut self, item: StreamItem) -> PollEvent {
        match item {
            StreamItem::Output(line) => {
                self.append_output(&line);
                PollEvent::Active
            }
            StreamItem::Status(line) => {
                self.last_activity = Instant::now();
                match parse_status_line(&line) {
                    Ok(status) => {
                        match &status {
                            StatusLine::ConffilePrompt { current, new } => {
                                warn!(current = %current, new = %new, "conffile prompt, keeping current version");
                                self.conffile_prompts.push(current.clone());
                                self.answer_prompt().await;
                            }
                            StatusLine::Error { package, message } => {
                                warn!(package = %package, message = %message, "native package error");
                                self.package_errors.push((package.clone(), message.clone()));
                            }
                            StatusLine::Ok { .. } => debug!(line = %line, "status"),
                        }
                        PollEvent::Status(status)
                    }
                    Err(malformed) => {
                        warn!(%malformed, "discarding status line");
                        PollEvent::Active
                    }
                }
            }
        }
    }

    /// Answer an interactive prompt with its default.
    ///
    /// A closed or broken stdin is not an error: the child has stopped
    /// listening.
    pub async fn answer_prompt(&mut self) {
        if let Some(stdin) = self.stdin.as_mut() {
            let written = async {
                stdin.write_all(KEEP_DEFAULT_ANSWER).await?;
                stdin.flush().await
            }
            .await;
            if let Err(e) = written {
                debug!(error = %e, "could not answer prompt");
                self.stdin = None;
            }
        }
    }

    /// Stop the child if it is still running. Safe to call repeatedly and
    /// after the child exited on its own.
    pub async fn terminate(&mut self) {
        if self.state != SupervisorState::Running {
            return;
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.finish(SupervisorState::Exited(status.code()));
            return;
        }
        self.interrupt_and_reap().await;
        self.finish(SupervisorState::Terminated);
    }

    async fn kill_for_inactivity(&mut self) {
        error!(
            command = %self.command,
            timeout_secs = self.settings.inactivity_timeout.as_secs(),
            "no status activity, interrupting native process"
        );
        self.interrupt_and_reap().await;
        self.finish(SupervisorState::Killed);
    }

    async fn interrupt_and_reap(&mut self) {
        self.stdin = None;
        if let Some(pid) = self.child.id() {
            if let Err(e) = send_signal(pid, libc::SIGINT) {
                debug!(pid, error = %e, "failed to interrupt child");
            }
        }
        if tokio::time::timeout(self.settings.terminate_grace, self.child.wait())
            .await
            .is_err()
        {
            warn!(command = %self.command, "child ignored interrupt, killing");
            let _ = self.child.start_kill();
            let _ = self.child.wait().await;
        }
    }

    fn finish(&mut self, state: SupervisorState) {
        self.state = state;
        self.stdin = None;
        // Collect what already arrived, then stop readers held open by grandchildren
        while let Ok(item) = self.rx.try_recv() {
            if let StreamItem::Output(line) = item {
                self.append_output(&line);
            }
        }
        for reader in &self.readers {
            reader.abort();
        }
    }

    fn append_output(&mut self, line: &str) {
        self.output.push_str(line);
        self.output.push('\n');
        if self.output.len() > self.settings.output_limit {
            let mut cut = self.output.len() - self.settings.output_limit;
            while !self.output.is_char_boundary(cut) {
                cut += 1;
            }
            self.output.drain(..cut);
        }
    }

    /// Files whose conffile prompt was answered with the default
    #[must_use]
    pub fn conffile_prompts(&self) -> &[String] {
        &self.conffile_prompts
    }

    /// `(package, message)` pairs reported through error status lines
    #[must_use]
    pub fn package_errors(&self) -> &[(String, String)] {
        &self.package_errors
    }

    /// Tail of the combined stdout and stderr
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    #[must_use]
    pub fn inactivity_timeout(&self) -> Duration {
        self.settings.inactivity_timeout
    }
}

impl Drop for SupervisedProcess {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SupervisorSettings {
        SupervisorSettings {
            inactivity_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(20),
            terminate_grace: Duration::from_millis(500),
            output_limit: 64,
        }
    }

    #[test]
    fn settings_follow_config() {
        let settings = SupervisorSettings::default();
        assert_eq!(settings.inactivity_timeout, Duration::from_secs(600));
        assert_eq!(settings.poll_interval, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn output_is_capped_to_the_tail() {
        let mut cmd = PlatformCommand::new("/bin/sh");
        cmd.args(["-c", "i=0; while [ $i -lt 20 ]; do echo line-$i; i=$((i+1)); done"]);
        let mut process = ProcessSupervisor::new(settings()).start(&cmd).unwrap();
        loop {
            if let PollEvent::Exited(code) = process.poll().await {
                assert_eq!(code, Some(0));
                break;
            }
        }
        assert!(process.output().len() <= 64);
        assert!(process.output().ends_with("line-19\n"));
    }

    #[tokio::test]
    async fn terminate_after_exit_is_a_noop() {
        let mut cmd = PlatformCommand::new("/bin/sh");
        cmd.args(["-c", "exit 3"]);
        let mut process = ProcessSupervisor::new(settings()).start(&cmd).unwrap();
        while !matches!(process.poll().await, PollEvent::Exited(_)) {}
        process.terminate().await;
        process.terminate().await;
        assert_eq!(process.state(), SupervisorState::Exited(Some(3)));
    }
}
