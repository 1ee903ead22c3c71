//! Driver status polling
//!
//! A detached submission leaves the driver running on the cluster after the
//! local submit process exits. [`StatusPoller::poll`] turns periodic queries
//! against a [`StatusSource`] into a lazy, fused sequence of snapshots that
//! ends after the first terminal snapshot, on cancellation, or after too many
//! consecutive failed queries. A query in flight also observes cancellation,
//! and the built-in source gives up on a query that outlives its deadline.

mod source;

pub use source::SubmitToolStatusSource;

use chrono::{DateTime, Utc};
use serde::Serialize;
use spark_status::{JobStatus, ScanError};
use std::io;
use std::iter::FusedIterator;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::command::CommandSpec;
use crate::config::DEFAULT_MAX_MISSED_REPORTS;
use crate::process::CommandError;

/// One observation of a detached job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl StatusSnapshot {
    pub fn new(status: JobStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            observed_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A single failed status query. Tolerated and counted by the poller.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("failed to run status query: {0}")]
    Io(#[from] io::Error),

    #[error("status query failed ({status})")]
    QueryFailed { status: ExitStatus },

    #[error("unreadable status report: {0}")]
    Unparseable(#[from] ScanError),

    #[error("status query timed out after {timeout:?}")]
    TimedOut { timeout: Duration },

    #[error("status query cancelled")]
    Cancelled,

    #[error("status endpoint unavailable: {0}")]
    Unavailable(String),
}

impl From<CommandError> for PollError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Io { source, .. } => PollError::Io(source),
            CommandError::TimedOut { timeout, .. } => PollError::TimedOut { timeout },
            CommandError::Cancelled { .. } => PollError::Cancelled,
        }
    }
}

/// What to ask the status endpoint about.
#[derive(Debug, Clone)]
pub struct StatusRequest {
    pub driver_id: String,
    /// Command that reports the driver's state.
    pub command: CommandSpec,
}

/// The status-reporting endpoint, treated as opaque.
pub trait StatusSource: Send + Sync {
    /// Ask once. Implementations that block should return
    /// [`PollError::Cancelled`] soon after `cancel` fires.
    fn query(&self, request: &StatusRequest, cancel: &CancelToken) -> Result<StatusSnapshot, PollError>;
}

/// Produces status sequences from a shared source.
#[derive(Clone)]
pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    max_missed_reports: u32,
}

impl std::fmt::Debug for StatusPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPoller")
            .field("max_missed_reports", &self.max_missed_reports)
            .finish_non_exhaustive()
    }
}

impl Default for StatusPoller {
    fn default() -> Self {
        Self::new(Arc::new(SubmitToolStatusSource::default()), DEFAULT_MAX_MISSED_REPORTS)
    }
}

impl StatusPoller {
    pub fn new(source: Arc<dyn StatusSource>, max_missed_reports: u32) -> Self {
        Self {
            source,
            max_missed_reports,
        }
    }

    pub fn max_missed_reports(&self) -> u32 {
        self.max_missed_reports
    }

    /// Start a new status sequence.
    ///
    /// The first query runs as soon as the sequence is advanced; later ones
    /// wait `interval` between them. Each call returns an independent
    /// sequence; a finished sequence stays finished.
    pub fn poll(&self, request: StatusRequest, interval: Duration, cancel: CancelToken) -> PollSequence {
        PollSequence {
            source: Arc::clone(&self.source),
            request,
            interval,
            cancel,
            max_missed: self.max_missed_reports,
            missed: 0,
            started: false,
            done: false,
        }
    }

    /// Run a single query outside of any sequence.
    pub fn query_once(&self, request: &StatusRequest) -> Result<StatusSnapshot, PollError> {
        self.source.query(request, &CancelToken::new())
    }
}

/// Lazy sequence of status snapshots for one driver.
pub struct PollSequence {
    source: Arc<dyn StatusSource>,
    request: StatusRequest,
    interval: Duration,
    cancel: CancelToken,
    max_missed: u32,
    missed: u32,
    started: bool,
    done: bool,
}

impl PollSequence {
    /// Consecutive failed queries so far.
    pub fn missed_reports(&self) -> u32 {
        self.missed
    }

    fn finish(&mut self) -> Option<StatusSnapshot> {
        self.done = true;
        None
    }
}

impl Iterator for PollSequence {
    type Item = StatusSnapshot;

    fn next(&mut self) -> Option<StatusSnapshot> {
        if self.done {
            return None;
        }

        loop {
            let cancelled = if self.started {
                self.cancel.wait_timeout(self.interval)
            } else {
                self.started = true;
                self.cancel.is_cancelled()
            };
            if cancelled {
                debug!(driver_id = %self.request.driver_id, "status polling cancelled");
                return self.finish();
            }

            match self.source.query(&self.request, &self.cancel) {
                Ok(snapshot) => {
                    self.missed = 0;
                    debug!(
                        driver_id = %self.request.driver_id,
                        status = %snapshot.status,
                        "driver status"
                    );
                    if snapshot.is_terminal() {
                        self.done = true;
                    }
                    return Some(snapshot);
                }
                Err(PollError::Cancelled) => {
                    debug!(driver_id = %self.request.driver_id, "status query cancelled");
                    return self.finish();
                }
                Err(e) => {
                    self.missed += 1;
                    warn!(
                        driver_id = %self.request.driver_id,
                        missed = self.missed,
                        max = self.max_missed,
                        error = %e,
                        "status query failed"
                    );
                    if self.missed >= self.max_missed {
                        self.done = true;
                        return Some(StatusSnapshot::new(
                            JobStatus::Unknown,
                            Some(format!(
                                "driver status unavailable after {} failed queries: {}",
                                self.missed, e
                            )),
                        ));
                    }
                }
            }
        }
    }
}

impl FusedIterator for PollSequence {}
