//! Submit process control
//!
//! Spawns the submit tool, drains its stdout and stderr on reader threads
//! into the handle's bounded transcript, and waits for it without
//! busy-spinning. Cancellation sends SIGTERM once; a child that outlives the
//! grace period is killed outright.

mod bounded;
mod buffer;

pub use bounded::{run_bounded, CommandError, MAX_CAPTURE_BYTES};
pub use buffer::OutputBuffer;

use spark_status::{JobStatus, OutputScanner};
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::command::CommandSpec;
use crate::config::LaneSettings;
use crate::handle::SubmissionHandle;

/// Upper bound on how long `wait` sleeps between exit checks.
const WAIT_TICK: Duration = Duration::from_millis(50);

/// How long output readers may lag behind process exit.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest transcript line; the rest of an over-long line is dropped.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

const TRUNCATED_MARKER: &str = " [truncated]";

/// Errors starting the submit process. No handle exists when these occur.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("empty command line")]
    EmptyCommand,

    #[error("submit tool not found: {program}")]
    NotFound { program: String },

    #[error("permission denied executing {program}")]
    PermissionDenied { program: String },

    #[error("failed to start {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    fn from_spawn(program: &str, err: io::Error) -> Self {
        let program = program.to_string();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound { program },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { program },
            _ => Self::Io {
                program,
                source: err,
            },
        }
    }
}

/// The OS child behind a handle.
#[derive(Debug)]
pub(crate) struct ProcessSlot {
    child: Child,
    signalled_at: Option<Instant>,
    force_killed: bool,
}

/// Per-launch options.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Scanner for identifiers in the output; none disables scanning.
    pub scanner: Option<OutputScanner>,

    /// The process only submits; a clean exit leaves the job running remotely.
    pub detached: bool,

    /// Cancellation shared with the caller.
    pub cancel: CancelToken,
}

/// How the submit process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalStatus {
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    /// Signal number when the child died from a signal.
    pub signal: Option<i32>,
    pub message: Option<String>,
}

/// Launches, waits on and kills submit processes.
#[derive(Debug, Clone)]
pub struct ProcessController {
    output_capacity: usize,
    termination_grace: Duration,
    command_timeout: Duration,
}

impl Default for ProcessController {
    fn default() -> Self {
        Self::new(&LaneSettings::default())
    }
}

impl ProcessController {
    pub fn new(settings: &LaneSettings) -> Self {
        Self {
            output_capacity: settings.output_capacity_bytes,
            termination_grace: settings.termination_grace,
            command_timeout: settings.command_timeout,
        }
    }

    /// Run a short-lived tool command under the configured timeout.
    pub fn run_command(&self, spec: &CommandSpec, cancel: &CancelToken) -> Result<Output, CommandError> {
        run_bounded(spec, self.command_timeout, cancel)
    }

    /// Start the process described by `spec`. Does not wait for it.
    pub fn launch(
        &self,
        spec: &CommandSpec,
        options: LaunchOptions,
    ) -> Result<SubmissionHandle, LaunchError> {
        let program = spec.argv.first().ok_or(LaunchError::EmptyCommand)?;

        let mut command = Command::new(program);
        command
            .args(spec.args())
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so signals reach the JVM the tool execs into.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|e| LaunchError::from_spawn(program, e))?;

        let handle = SubmissionHandle::new(self.output_capacity, options.cancel);
        let pid = child.id();
        info!(attempt = %handle.id(), pid, command = %spec.masked(), "submit process started");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        {
            let mut state = handle.state();
            state.pid = Some(pid);
            state.status = JobStatus::Running;
            state.detached = options.detached;
        }
        *handle.inner.process.lock().unwrap_or_else(|e| e.into_inner()) = Some(ProcessSlot {
            child,
            signalled_at: None,
            force_killed: false,
        });

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = stdout {
            readers.push(spawn_reader(stdout, handle.clone(), options.scanner));
        }
        if let Some(stderr) = stderr {
            readers.push(spawn_reader(stderr, handle.clone(), options.scanner));
        }
        handle
            .inner
            .readers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(readers);

        Ok(handle)
    }

    /// Block until the process exits or is killed after cancellation.
    ///
    /// A nonzero exit is reported as FAILED, not as an error. For detached
    /// launches a clean exit leaves the handle RUNNING.
    pub fn wait(&self, handle: &SubmissionHandle) -> TerminalStatus {
        let token = handle.cancel_token();
        let exit = loop {
            if token.is_cancelled() {
                self.signal(handle);
            }

            match self.check_exit(handle) {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => {}
                Err(e) => break Err(e),
            }

            // Once cancelled the token no longer blocks; pace the exit checks.
            if token.is_cancelled() {
                thread::sleep(WAIT_TICK);
            } else {
                token.wait_timeout(WAIT_TICK);
            }
        };

        self.drain_readers(handle);

        let terminal = match exit {
            Ok(status) => self.classify(handle, status),
            Err(e) => {
                warn!(attempt = %handle.id(), error = %e, "lost track of submit process");
                TerminalStatus {
                    status: JobStatus::Unknown,
                    exit_code: None,
                    signal: None,
                    message: Some(format!("failed to wait on submit process: {}", e)),
                }
            }
        };

        {
            let mut state = handle.state();
            state.pid = None;
            state.exit_code = terminal.exit_code;
        }

        let detached_submit = handle.state().detached && terminal.status == JobStatus::Succeeded;
        if !detached_submit {
            handle.finish(terminal.status, terminal.message.clone());
        }

        info!(
            attempt = %handle.id(),
            status = %terminal.status,
            exit_code = ?terminal.exit_code,
            "submit process finished"
        );
        terminal
    }

    /// Ask the process to terminate.
    ///
    /// Returns true if this call sent the signal. Safe to call from any
    /// thread, any number of times, while `wait` is running.
    pub fn kill(&self, handle: &SubmissionHandle) -> bool {
        let sent = !handle.is_terminal() && self.signal(handle);
        handle.cancel_token().cancel();
        sent
    }

    fn signal(&self, handle: &SubmissionHandle) -> bool {
        let mut guard = handle.inner.process.lock().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = guard.as_mut() else {
            return false;
        };

        // Already exited: nothing to signal, the natural exit stands.
        if !matches!(slot.child.try_wait(), Ok(None)) {
            return false;
        }

        if handle.inner.signal_sent.swap(true, Ordering::SeqCst) {
            return false;
        }

        info!(attempt = %handle.id(), pid = slot.child.id(), "sending SIGTERM to submit process");
        send_terminate(&mut slot.child);
        slot.signalled_at = Some(Instant::now());
        true
    }

    fn check_exit(&self, handle: &SubmissionHandle) -> io::Result<Option<ExitStatus>> {
        let mut guard = handle.inner.process.lock().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = guard.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no process attached"));
        };

        if let Some(status) = slot.child.try_wait()? {
            return Ok(Some(status));
        }

        if let Some(signalled_at) = slot.signalled_at {
            if !slot.force_killed && signalled_at.elapsed() >= self.termination_grace {
                warn!(
                    attempt = %handle.id(),
                    grace_secs = self.termination_grace.as_secs(),
                    "submit process ignored SIGTERM, killing"
                );
                force_kill(&mut slot.child)?;
                slot.force_killed = true;
            }
        }

        Ok(None)
    }

    /// Join the reader threads, giving up on streams held open by stray
    /// descendants after [`READER_DRAIN_TIMEOUT`].
    fn drain_readers(&self, handle: &SubmissionHandle) {
        let mut readers: Vec<_> = handle
            .inner
            .readers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        let deadline = Instant::now() + READER_DRAIN_TIMEOUT;
        while !readers.iter().all(|r| r.is_finished()) {
            if Instant::now() >= deadline {
                warn!(attempt = %handle.id(), "output streams still open after exit, detaching readers");
                return;
            }
            thread::sleep(WAIT_TICK);
        }
        for reader in readers.drain(..) {
            let _ = reader.join();
        }
    }

    fn classify(&self, handle: &SubmissionHandle, status: ExitStatus) -> TerminalStatus {
        let exit_code = status.code();
        let signal = exit_signal(&status);

        if handle.inner.signal_sent.load(Ordering::SeqCst) {
            return TerminalStatus {
                status: JobStatus::Killed,
                exit_code,
                signal,
                message: Some("submit process terminated on request".to_string()),
            };
        }

        let reported = handle.state().reported_exit_code;
        match (exit_code, reported) {
            (Some(0), Some(code)) if code != 0 => TerminalStatus {
                status: JobStatus::Failed,
                exit_code,
                signal,
                message: Some(handle.failure_message(&format!("driver exited with code {}", code))),
            },
            (Some(0), _) => TerminalStatus {
                status: JobStatus::Succeeded,
                exit_code,
                signal,
                message: None,
            },
            (Some(code), _) => TerminalStatus {
                status: JobStatus::Failed,
                exit_code,
                signal,
                message: Some(handle.failure_message(&format!("submit process exited with code {}", code))),
            },
            (None, _) => TerminalStatus {
                status: JobStatus::Failed,
                exit_code,
                signal,
                message: Some(handle.failure_message(&format!(
                    "submit process died from signal {}",
                    signal.map(|s| s.to_string()).unwrap_or_else(|| "?".to_string())
                ))),
            },
        }
    }
}

fn spawn_reader<R>(
    stream: R,
    handle: SubmissionHandle,
    scanner: Option<OutputScanner>,
) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match read_line_capped(&mut reader, &mut buf) {
                Ok(None) => break,
                Ok(Some(truncated)) => {
                    let mut line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(&['\n', '\r'][..])
                        .to_string();
                    if truncated {
                        line.push_str(TRUNCATED_MARKER);
                    }
                    info!(target: "spark_submit", "{}", line);
                    let events = scanner.map(|s| s.scan_line(&line)).unwrap_or_default();
                    if !events.is_empty() {
                        debug!(attempt = %handle.id(), ?events, "captured from output");
                    }
                    handle.record_line(line, events);
                }
                Err(e) => {
                    debug!(attempt = %handle.id(), error = %e, "output stream closed");
                    break;
                }
            }
        }
    })
}

/// Read one line of at most [`MAX_LINE_BYTES`] into `buf`, discarding the
/// remainder of longer lines. `None` at end of stream, otherwise whether the
/// line was cut.
fn read_line_capped<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<bool>> {
    let read = reader
        .by_ref()
        .take(MAX_LINE_BYTES as u64)
        .read_until(b'\n', buf)?;
    if read == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') || read < MAX_LINE_BYTES {
        return Ok(Some(false));
    }

    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            break;
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                break;
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
    Ok(Some(true))
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(pgid, Signal::SIGTERM) {
        warn!(pid = child.id(), error = %e, "SIGTERM delivery failed");
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!(pid = child.id(), error = %e, "terminate failed");
    }
}

#[cfg(unix)]
fn force_kill(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(child.id() as i32);
    killpg(pgid, Signal::SIGKILL).or_else(|_| child.kill())
}

#[cfg(not(unix))]
fn force_kill(child: &mut Child) -> io::Result<()> {
    child.kill()
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec {
            argv: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            env: BTreeMap::new(),
        }
    }

    fn controller() -> ProcessController {
        ProcessController::new(&LaneSettings {
            termination_grace: Duration::from_secs(2),
            ..Default::default()
        })
    }

    #[test]
    fn test_launch_and_wait_success() {
        let pc = controller();
        let handle = pc.launch(&sh("echo hello; echo oops >&2"), LaunchOptions::default()).unwrap();
        assert!(handle.pid().is_some());

        let terminal = pc.wait(&handle);

        assert_eq!(terminal.status, JobStatus::Succeeded);
        assert_eq!(terminal.exit_code, Some(0));
        assert_eq!(handle.status(), JobStatus::Succeeded);
        assert!(handle.pid().is_none());
        let output = handle.output();
        assert!(output.contains("hello"));
        assert!(output.contains("oops"));
    }

    #[test]
    fn test_nonzero_exit_is_failed_with_output() {
        let pc = controller();
        let handle = pc.launch(&sh("echo boom; exit 3"), LaunchOptions::default()).unwrap();

        let terminal = pc.wait(&handle);

        assert_eq!(terminal.status, JobStatus::Failed);
        assert_eq!(terminal.exit_code, Some(3));
        let message = handle.message().unwrap();
        assert!(message.contains("code 3"));
        assert!(message.contains("boom"));
    }

    #[test]
    fn test_env_overlay_reaches_child() {
        let pc = controller();
        let mut spec = sh("echo value=$LANE_TEST_VAR");
        spec.env.insert("LANE_TEST_VAR".to_string(), "42".to_string());

        let handle = pc.launch(&spec, LaunchOptions::default()).unwrap();
        pc.wait(&handle);

        assert!(handle.output().contains("value=42"));
    }

    #[test]
    fn test_missing_binary_is_launch_error() {
        let pc = controller();
        let spec = CommandSpec {
            argv: vec!["/nonexistent/spark-submit".to_string()],
            env: BTreeMap::new(),
        };

        let err = pc.launch(&spec, LaunchOptions::default()).unwrap_err();
        assert!(matches!(err, LaunchError::NotFound { .. }));
    }

    #[test]
    fn test_empty_command_is_launch_error() {
        let spec = CommandSpec {
            argv: Vec::new(),
            env: BTreeMap::new(),
        };
        assert!(matches!(
            controller().launch(&spec, LaunchOptions::default()).unwrap_err(),
            LaunchError::EmptyCommand
        ));
    }

    #[test]
    fn test_kill_interrupts_wait() {
        let pc = Arc::new(controller());
        let handle = pc.launch(&sh("sleep 30"), LaunchOptions::default()).unwrap();

        let killer = {
            let pc = Arc::clone(&pc);
            let handle = handle.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                pc.kill(&handle)
            })
        };

        let start = Instant::now();
        let terminal = pc.wait(&handle);

        assert!(killer.join().unwrap());
        assert_eq!(terminal.status, JobStatus::Killed);
        assert_eq!(handle.status(), JobStatus::Killed);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_kill_sends_at_most_one_signal() {
        let pc = controller();
        let handle = pc.launch(&sh("sleep 30"), LaunchOptions::default()).unwrap();

        assert!(pc.kill(&handle));
        assert!(!pc.kill(&handle));
        assert_eq!(pc.wait(&handle).status, JobStatus::Killed);
        assert!(!pc.kill(&handle));
    }

    #[test]
    fn test_kill_after_exit_is_noop() {
        let pc = controller();
        let handle = pc.launch(&sh("exit 0"), LaunchOptions::default()).unwrap();
        pc.wait(&handle);

        assert!(!pc.kill(&handle));
        assert_eq!(handle.status(), JobStatus::Succeeded);
    }

    #[test]
    fn test_sigterm_ignored_escalates_to_kill() {
        let pc = ProcessController::new(&LaneSettings {
            termination_grace: Duration::from_millis(200),
            ..Default::default()
        });
        let handle = pc
            .launch(&sh("trap '' TERM; sleep 30"), LaunchOptions::default())
            .unwrap();
        thread::sleep(Duration::from_millis(100));

        pc.kill(&handle);
        let start = Instant::now();
        let terminal = pc.wait(&handle);

        assert_eq!(terminal.status, JobStatus::Killed);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_detached_clean_exit_leaves_handle_running() {
        let pc = controller();
        let options = LaunchOptions {
            detached: true,
            ..Default::default()
        };
        let handle = pc.launch(&sh("exit 0"), options).unwrap();

        let terminal = pc.wait(&handle);

        assert_eq!(terminal.status, JobStatus::Succeeded);
        assert_eq!(handle.status(), JobStatus::Running);
        assert_eq!(handle.exit_code(), Some(0));
    }

    #[test]
    fn test_kill_race_with_natural_exit_has_one_outcome() {
        for _ in 0..20 {
            let pc = Arc::new(controller());
            let handle = pc.launch(&sh("exit 0"), LaunchOptions::default()).unwrap();

            let killer = {
                let pc = Arc::clone(&pc);
                let handle = handle.clone();
                thread::spawn(move || pc.kill(&handle))
            };
            let terminal = pc.wait(&handle);
            let signalled = killer.join().unwrap();

            match terminal.status {
                JobStatus::Killed => assert!(signalled),
                JobStatus::Succeeded => assert!(!signalled),
                other => panic!("unexpected outcome {:?}", other),
            }
            assert_eq!(handle.status(), terminal.status);
        }
    }

    #[test]
    fn test_overlong_line_is_truncated() {
        let pc = controller();
        let handle = pc
            .launch(
                &sh("head -c 200000 /dev/zero | tr '\\0' a; echo; echo next"),
                LaunchOptions::default(),
            )
            .unwrap();
        pc.wait(&handle);

        let output = handle.output();
        let mut lines = output.lines();
        let first = lines.next().unwrap();
        assert_eq!(first.len(), MAX_LINE_BYTES + TRUNCATED_MARKER.len());
        assert!(first.ends_with(TRUNCATED_MARKER));
        assert_eq!(lines.next(), Some("next"));
    }

    #[test]
    fn test_read_line_capped_keeps_short_lines() {
        let mut reader = io::Cursor::new(b"one\ntwo".to_vec());
        let mut buf = Vec::new();

        assert_eq!(read_line_capped(&mut reader, &mut buf).unwrap(), Some(false));
        assert_eq!(buf, b"one\n");
        buf.clear();
        assert_eq!(read_line_capped(&mut reader, &mut buf).unwrap(), Some(false));
        assert_eq!(buf, b"two");
        buf.clear();
        assert_eq!(read_line_capped(&mut reader, &mut buf).unwrap(), None);
    }

    #[test]
    fn test_transcript_is_bounded() {
        let pc = ProcessController::new(&LaneSettings {
            output_capacity_bytes: 256,
            ..Default::default()
        });
        let handle = pc
            .launch(&sh("i=0; while [ $i -lt 500 ]; do echo line-$i; i=$((i+1)); done"), LaunchOptions::default())
            .unwrap();
        pc.wait(&handle);

        let output = handle.output();
        assert!(output.len() <= 256);
        assert!(output.ends_with("line-499"));
        assert!(!output.contains("line-0\n"));
    }
}
