//! Driver and job state enumerations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ScanError;

/// Driver state as reported by a standalone master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverState {
    Submitted,
    Running,
    Relaunching,
    Finished,
    Unknown,
    Killed,
    Failed,
    Error,
}

impl DriverState {
    /// Wire name used by the master.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Running => "RUNNING",
            Self::Relaunching => "RELAUNCHING",
            Self::Finished => "FINISHED",
            Self::Unknown => "UNKNOWN",
            Self::Killed => "KILLED",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverState {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUBMITTED" => Ok(Self::Submitted),
            "RUNNING" => Ok(Self::Running),
            "RELAUNCHING" => Ok(Self::Relaunching),
            "FINISHED" => Ok(Self::Finished),
            "UNKNOWN" => Ok(Self::Unknown),
            "KILLED" => Ok(Self::Killed),
            "FAILED" => Ok(Self::Failed),
            "ERROR" => Ok(Self::Error),
            other => Err(ScanError::UnknownDriverState(other.to_string())),
        }
    }
}

/// Status of one submission attempt.
///
/// `Succeeded`, `Failed`, `Killed` and `Unknown` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Killed,
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Killed => "KILLED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DriverState> for JobStatus {
    fn from(state: DriverState) -> Self {
        match state {
            DriverState::Submitted => Self::Pending,
            DriverState::Running | DriverState::Relaunching => Self::Running,
            DriverState::Finished => Self::Succeeded,
            DriverState::Failed | DriverState::Error => Self::Failed,
            DriverState::Killed => Self::Killed,
            DriverState::Unknown => Self::Unknown,
        }
    }
}
