//! Status source backed by the submit tool's `--status` mode.

use spark_status::{JobStatus, StatusReport};
use std::time::Duration;
use tracing::debug;

use super::{PollError, StatusRequest, StatusSnapshot, StatusSource};
use crate::cancel::CancelToken;
use crate::config::DEFAULT_COMMAND_TIMEOUT_SECONDS;
use crate::process::run_bounded;

/// Runs the rendered status command and parses `driverState` from what it
/// prints. The tool logs the REST response on stderr, so both streams are
/// searched.
#[derive(Debug, Clone, Copy)]
pub struct SubmitToolStatusSource {
    timeout: Duration,
}

impl SubmitToolStatusSource {
    /// Source whose queries are abandoned after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SubmitToolStatusSource {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECONDS))
    }
}

impl StatusSource for SubmitToolStatusSource {
    fn query(&self, request: &StatusRequest, cancel: &CancelToken) -> Result<StatusSnapshot, PollError> {
        let spec = &request.command;
        debug!(driver_id = %request.driver_id, command = %spec.masked(), "querying driver status");

        let output = run_bounded(spec, self.timeout, cancel)?;

        if !output.status.success() {
            return Err(PollError::QueryFailed {
                status: output.status,
            });
        }

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        let report = StatusReport::parse(&text)?;
        Ok(StatusSnapshot::new(JobStatus::from(report.state), report.message))
    }
}
