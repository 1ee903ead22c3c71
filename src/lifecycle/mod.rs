//! Submission lifecycle
//!
//! Drives one attempt: build the command, launch the submit process, and
//! either wait on it directly or, once it has handed a driver over to a
//! standalone cluster, follow the driver through status polls.
//!
//! A controller runs exactly one attempt. Cancellation may come from any
//! thread at any time through [`LifecycleController::cancel`].

mod state;

pub use state::LifecycleState;

use serde::Serialize;
use spark_status::{JobStatus, OutputScanner};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::command::CommandBuilder;
use crate::config::{DeployMode, LaneSettings, SubmissionConfig};
use crate::error::{LaneError, RuntimeFailure};
use crate::handle::{HandleSnapshot, SubmissionHandle};
use crate::poll::{StatusPoller, StatusRequest, StatusSource, SubmitToolStatusSource};
use crate::process::{LaunchOptions, ProcessController};

/// Final result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReport {
    pub status: JobStatus,
    pub state: LifecycleState,
    /// The driver was handed off to the cluster and polled.
    pub detached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<HandleSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SubmissionReport {
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    /// Turn a non-successful outcome into an error.
    pub fn ensure_succeeded(&self) -> Result<(), RuntimeFailure> {
        let message = || {
            self.message
                .clone()
                .unwrap_or_else(|| format!("submission ended {}", self.status))
        };
        match self.status {
            JobStatus::Succeeded => Ok(()),
            JobStatus::Killed => Err(RuntimeFailure::Killed),
            JobStatus::Failed => Err(RuntimeFailure::Failed { message: message() }),
            JobStatus::Unknown | JobStatus::Pending | JobStatus::Running => {
                Err(RuntimeFailure::Unknown { message: message() })
            }
        }
    }
}

/// Orchestrates build, launch, poll and finalize for a single attempt.
pub struct LifecycleController {
    builder: CommandBuilder,
    processes: ProcessController,
    poller: StatusPoller,
    cancel: CancelToken,
    state: Mutex<LifecycleState>,
    handle: Mutex<Option<SubmissionHandle>>,
    started: AtomicBool,
}

impl LifecycleController {
    pub fn new(builder: CommandBuilder, processes: ProcessController, poller: StatusPoller) -> Self {
        Self {
            builder,
            processes,
            poller,
            cancel: CancelToken::new(),
            state: Mutex::new(LifecycleState::Idle),
            handle: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Controller wired with the default collaborators.
    pub fn from_settings(settings: &LaneSettings) -> Self {
        Self::new(
            CommandBuilder::new(),
            ProcessController::new(settings),
            StatusPoller::new(
                Arc::new(SubmitToolStatusSource::new(settings.command_timeout)),
                settings.max_missed_reports,
            ),
        )
    }

    /// Controller wired with the default builder and process controller and
    /// a caller-supplied status source.
    pub fn with_status_source(settings: &LaneSettings, source: Arc<dyn StatusSource>) -> Self {
        Self::new(
            CommandBuilder::new(),
            ProcessController::new(settings),
            StatusPoller::new(source, settings.max_missed_reports),
        )
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Handle of the current attempt, once launched.
    pub fn handle(&self) -> Option<SubmissionHandle> {
        self.handle.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Request cancellation. Idempotent; a no-op once terminal.
    ///
    /// Returns true if this call signalled the submit process.
    pub fn cancel(&self) -> bool {
        if self.cancel.cancel() {
            info!(state = %self.state(), "cancellation requested");
        }
        match self.handle() {
            Some(handle) => self.processes.kill(&handle),
            None => false,
        }
    }

    /// Run one attempt to a terminal state.
    ///
    /// Configuration and launch failures are returned as errors; every other
    /// outcome, including failure and cancellation, is a report.
    pub fn execute(&self, config: &SubmissionConfig) -> Result<SubmissionReport, LaneError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(LaneError::AlreadyStarted);
        }

        self.transition(LifecycleState::Building);
        let spec = match self.builder.build(config) {
            Ok(spec) => spec,
            Err(e) => {
                warn!(error = %e, "invalid submission config");
                self.transition(LifecycleState::Failed);
                return Err(e.into());
            }
        };

        if self.cancel.is_cancelled() {
            self.transition(LifecycleState::Killed);
            return Ok(self.report(None, false, Some("cancelled before launch".to_string())));
        }

        self.transition(LifecycleState::Launching);
        let detached = config.cluster.tracks_driver_status();
        let options = LaunchOptions {
            scanner: Some(OutputScanner::new(config.cluster.manager(), detached)),
            detached,
            cancel: self.cancel.clone(),
        };
        let handle = match self.processes.launch(&spec, options) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "submit process failed to start");
                self.transition(LifecycleState::Failed);
                return Err(e.into());
            }
        };
        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle.clone());
        info!(
            attempt = %handle.id(),
            master = %config.cluster.master,
            detached,
            "submission launched"
        );

        if detached {
            self.run_detached(config, &handle);
        } else {
            self.transition(LifecycleState::RunningAttached);
            self.processes.wait(&handle);
            self.finalize(config, &handle);
        }

        Ok(self.report(Some(&handle), detached, handle.message()))
    }

    fn run_detached(&self, config: &SubmissionConfig, handle: &SubmissionHandle) {
        let submitted = self.processes.wait(handle);
        if submitted.status != JobStatus::Succeeded {
            self.finalize(config, handle);
            return;
        }

        let Some(driver_id) = handle.driver_id() else {
            handle.finish(
                JobStatus::Failed,
                Some(handle.failure_message("no driver id found in submit output")),
            );
            self.finalize(config, handle);
            return;
        };

        self.transition(LifecycleState::RunningDetached);
        info!(attempt = %handle.id(), driver_id = %driver_id, "driver submitted, polling status");

        let request = StatusRequest {
            command: self.builder.status_command(config, &driver_id),
            driver_id,
        };
        for snapshot in self
            .poller
            .poll(request, config.poll_interval(), self.cancel.clone())
        {
            handle.apply_snapshot(&snapshot);
        }

        if !handle.is_terminal() {
            handle.finish(
                JobStatus::Killed,
                Some("cancelled while polling driver status".to_string()),
            );
        }
        self.finalize(config, handle);
    }

    /// Move to the handle's terminal state, stopping the remote job first if
    /// the attempt was killed.
    fn finalize(&self, config: &SubmissionConfig, handle: &SubmissionHandle) {
        let status = handle.status();
        if status == JobStatus::Killed {
            self.kill_remote(config, handle);
        }
        self.transition(LifecycleState::from_terminal(status));
        info!(attempt = %handle.id(), status = %status, "submission finished");
    }

    /// Best-effort kill of whatever is still running on the cluster.
    fn kill_remote(&self, config: &SubmissionConfig, handle: &SubmissionHandle) {
        // In client mode the application dies with the local process.
        let application_id = match config.cluster.deploy_mode {
            Some(DeployMode::Cluster) => handle.application_id(),
            _ => None,
        };
        let Some(spec) = self.builder.kill_command(
            config,
            handle.driver_id().as_deref(),
            application_id.as_deref(),
        ) else {
            return;
        };

        info!(attempt = %handle.id(), command = %spec.masked(), "stopping remote job");
        // The attempt's own token is already cancelled; the kill runs to its deadline.
        match self.processes.run_command(&spec, &CancelToken::new()) {
            Ok(output) if output.status.success() => {}
            Ok(output) => warn!(
                attempt = %handle.id(),
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "remote kill failed"
            ),
            Err(e) => warn!(attempt = %handle.id(), error = %e, "remote kill failed"),
        }
    }

    fn transition(&self, target: LifecycleState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let current = *state;
        if !current.can_transition_to(target) {
            warn!(from = %current, to = %target, "ignoring invalid lifecycle transition");
            return;
        }
        debug!(from = %current, to = %target, "lifecycle transition");
        *state = target;
    }

    fn report(
        &self,
        handle: Option<&SubmissionHandle>,
        detached: bool,
        message: Option<String>,
    ) -> SubmissionReport {
        let state = self.state();
        let status = match handle {
            Some(handle) => handle.status(),
            None if state.is_terminal() => JobStatus::Killed,
            None => JobStatus::Unknown,
        };
        SubmissionReport {
            status,
            state,
            detached,
            submission: handle.map(SubmissionHandle::snapshot),
            message,
        }
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("state", &self.state())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::poll::{PollError, StatusSnapshot};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn write_tool(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn config_with_tool(binary: String) -> SubmissionConfig {
        SubmissionConfig {
            binary: Some(binary),
            ..SubmissionConfig::new("job.jar")
        }
    }

    struct FixedSource(JobStatus);

    impl StatusSource for FixedSource {
        fn query(&self, _request: &StatusRequest, _cancel: &CancelToken) -> Result<StatusSnapshot, PollError> {
            Ok(StatusSnapshot::new(self.0, None))
        }
    }

    fn controller(source: JobStatus) -> LifecycleController {
        LifecycleController::with_status_source(&LaneSettings::default(), Arc::new(FixedSource(source)))
    }

    #[test]
    fn test_attached_success() {
        let dir = TempDir::new().unwrap();
        let tool = write_tool(dir.path(), "spark-submit", "echo \"args: $*\"");
        let lc = controller(JobStatus::Succeeded);

        let report = lc.execute(&config_with_tool(tool)).unwrap();

        assert_eq!(report.status, JobStatus::Succeeded);
        assert_eq!(report.state, LifecycleState::Succeeded);
        assert!(!report.detached);
        assert_eq!(lc.state(), LifecycleState::Succeeded);
        assert!(lc.handle().unwrap().output().contains("--master yarn"));
        assert!(report.ensure_succeeded().is_ok());
    }

    #[test]
    fn test_attached_failure_reports_output() {
        let dir = TempDir::new().unwrap();
        let tool = write_tool(dir.path(), "spark-submit", "echo 'Exception: bad jar' >&2; exit 1");
        let lc = controller(JobStatus::Succeeded);

        let report = lc.execute(&config_with_tool(tool)).unwrap();

        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(lc.state(), LifecycleState::Failed);
        assert!(report.message.as_deref().unwrap().contains("bad jar"));
        assert!(matches!(
            report.ensure_succeeded(),
            Err(RuntimeFailure::Failed { .. })
        ));
    }

    #[test]
    fn test_config_error_is_terminal() {
        let lc = controller(JobStatus::Succeeded);
        let err = lc.execute(&SubmissionConfig::new("")).unwrap_err();

        assert!(matches!(err, LaneError::Config(_)));
        assert_eq!(lc.state(), LifecycleState::Failed);
        assert!(lc.handle().is_none());
    }

    #[test]
    fn test_launch_error_has_no_handle() {
        let lc = controller(JobStatus::Succeeded);
        let config = config_with_tool("/nonexistent/spark-submit".to_string());

        let err = lc.execute(&config).unwrap_err();

        assert!(matches!(err, LaneError::Launch(_)));
        assert_eq!(lc.state(), LifecycleState::Failed);
        assert!(lc.handle().is_none());
    }

    #[test]
    fn test_controller_is_single_use() {
        let dir = TempDir::new().unwrap();
        let tool = write_tool(dir.path(), "spark-submit", "exit 0");
        let lc = controller(JobStatus::Succeeded);
        let config = config_with_tool(tool);

        lc.execute(&config).unwrap();
        assert!(matches!(lc.execute(&config), Err(LaneError::AlreadyStarted)));
    }

    #[test]
    fn test_cancel_before_execute_never_launches() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("launched");
        let tool = write_tool(
            dir.path(),
            "spark-submit",
            &format!("touch {}", marker.display()),
        );
        let lc = controller(JobStatus::Succeeded);
        assert!(!lc.cancel());

        let report = lc.execute(&config_with_tool(tool)).unwrap();

        assert_eq!(report.status, JobStatus::Killed);
        assert_eq!(report.state, LifecycleState::Killed);
        assert!(report.submission.is_none());
        assert!(!marker.exists());
    }

    #[test]
    fn test_cancel_while_attached() {
        let dir = TempDir::new().unwrap();
        let tool = write_tool(dir.path(), "spark-submit", "sleep 30");
        let lc = Arc::new(controller(JobStatus::Succeeded));
        let config = config_with_tool(tool);

        let runner = {
            let lc = Arc::clone(&lc);
            thread::spawn(move || lc.execute(&config))
        };
        let deadline = Instant::now() + Duration::from_secs(5);
        while lc.state() != LifecycleState::RunningAttached && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        let start = Instant::now();
        lc.cancel();
        let report = runner.join().unwrap().unwrap();

        assert_eq!(report.status, JobStatus::Killed);
        assert_eq!(lc.state(), LifecycleState::Killed);
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(!lc.cancel());
    }

    #[test]
    fn test_detached_without_driver_id_fails() {
        let dir = TempDir::new().unwrap();
        let tool = write_tool(dir.path(), "spark-submit", "echo submitted");
        let lc = controller(JobStatus::Succeeded);
        let mut config = config_with_tool(tool);
        config.cluster.master = "spark://master:7077".to_string();
        config.cluster.deploy_mode = Some(DeployMode::Cluster);

        let report = lc.execute(&config).unwrap();

        assert!(report.detached);
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(lc.state(), LifecycleState::Failed);
        assert!(report.message.unwrap().contains("no driver id"));
    }

    #[test]
    fn test_detached_poll_failure_status() {
        let dir = TempDir::new().unwrap();
        let tool = write_tool(
            dir.path(),
            "spark-submit",
            r#"echo '  "driverId" : "driver-20240101000000-0007",' >&2"#,
        );
        let lc = controller(JobStatus::Failed);
        let mut config = config_with_tool(tool);
        config.cluster.master = "spark://master:7077".to_string();
        config.cluster.deploy_mode = Some(DeployMode::Cluster);

        let report = lc.execute(&config).unwrap();

        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(lc.state(), LifecycleState::Failed);
        assert_eq!(
            report.submission.unwrap().driver_id.as_deref(),
            Some("driver-20240101000000-0007")
        );
    }

    #[test]
    fn test_report_serializes_screaming_case() {
        let report = SubmissionReport {
            status: JobStatus::Killed,
            state: LifecycleState::Killed,
            detached: false,
            submission: None,
            message: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "KILLED");
        assert_eq!(json["state"], "KILLED");
        assert!(json.get("submission").is_none());
    }
}
