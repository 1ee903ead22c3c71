//! Top-level error types

use spark_status::JobStatus;
use thiserror::Error;

use crate::config::ConfigError;
use crate::process::LaunchError;

/// Errors that abort a submission before it has a terminal status.
#[derive(Debug, Error)]
pub enum LaneError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("lifecycle controller already started; use a new controller per attempt")]
    AlreadyStarted,
}

/// A submission that ran but did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeFailure {
    #[error("submission failed: {message}")]
    Failed { message: String },

    #[error("submission was killed")]
    Killed,

    #[error("submission status unknown: {message}")]
    Unknown { message: String },
}

impl RuntimeFailure {
    pub fn status(&self) -> JobStatus {
        match self {
            RuntimeFailure::Failed { .. } => JobStatus::Failed,
            RuntimeFailure::Killed => JobStatus::Killed,
            RuntimeFailure::Unknown { .. } => JobStatus::Unknown,
        }
    }
}
