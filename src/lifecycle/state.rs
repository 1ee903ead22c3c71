//! Lifecycle state machine
//!
//! IDLE → BUILDING → LAUNCHING → {RUNNING_ATTACHED | RUNNING_DETACHED}
//! → {SUCCEEDED | FAILED | KILLED | UNKNOWN}

use serde::{Deserialize, Serialize};
use spark_status::JobStatus;
use std::fmt;

/// Lifecycle controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Nothing has happened yet
    Idle,
    /// Rendering the command line
    Building,
    /// Submit process started; for detached runs, waiting for the hand-off
    Launching,
    /// Awaiting the submit process directly
    RunningAttached,
    /// Driver runs on the cluster; following it through status polls
    RunningDetached,
    Succeeded,
    Failed,
    Killed,
    Unknown,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Succeeded
                | LifecycleState::Failed
                | LifecycleState::Killed
                | LifecycleState::Unknown
        )
    }

    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: LifecycleState) -> bool {
        use LifecycleState::*;

        match (self, target) {
            (Idle, Building) => true,

            // Build failures are terminal
            (Building, Launching) => true,
            (Building, Failed) => true,
            (Building, Killed) => true,

            (Launching, RunningAttached) => true,
            (Launching, RunningDetached) => true,
            // Detached submit process failed or never reported a driver
            (Launching, Failed) => true,
            (Launching, Killed) => true,
            (Launching, Unknown) => true,

            (RunningAttached, Succeeded | Failed | Killed | Unknown) => true,
            (RunningDetached, Succeeded | Failed | Killed | Unknown) => true,

            _ => false,
        }
    }

    /// Terminal state for a terminal job status.
    pub fn from_terminal(status: JobStatus) -> LifecycleState {
        match status {
            JobStatus::Succeeded => LifecycleState::Succeeded,
            JobStatus::Failed => LifecycleState::Failed,
            JobStatus::Killed => LifecycleState::Killed,
            JobStatus::Unknown | JobStatus::Pending | JobStatus::Running => LifecycleState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "IDLE",
            LifecycleState::Building => "BUILDING",
            LifecycleState::Launching => "LAUNCHING",
            LifecycleState::RunningAttached => "RUNNING_ATTACHED",
            LifecycleState::RunningDetached => "RUNNING_DETACHED",
            LifecycleState::Succeeded => "SUCCEEDED",
            LifecycleState::Failed => "FAILED",
            LifecycleState::Killed => "KILLED",
            LifecycleState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attached_path() {
        let path = [
            LifecycleState::Idle,
            LifecycleState::Building,
            LifecycleState::Launching,
            LifecycleState::RunningAttached,
            LifecycleState::Succeeded,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_detached_path() {
        assert!(LifecycleState::Launching.can_transition_to(LifecycleState::RunningDetached));
        assert!(LifecycleState::RunningDetached.can_transition_to(LifecycleState::Unknown));
        assert!(LifecycleState::RunningDetached.can_transition_to(LifecycleState::Killed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            LifecycleState::Succeeded,
            LifecycleState::Failed,
            LifecycleState::Killed,
            LifecycleState::Unknown,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(LifecycleState::Building));
            assert!(!terminal.can_transition_to(LifecycleState::Succeeded));
        }
    }

    #[test]
    fn test_no_skipping_launch() {
        assert!(!LifecycleState::Idle.can_transition_to(LifecycleState::Launching));
        assert!(!LifecycleState::Building.can_transition_to(LifecycleState::RunningAttached));
        assert!(!LifecycleState::Launching.can_transition_to(LifecycleState::Succeeded));
        assert!(!LifecycleState::RunningAttached.can_transition_to(LifecycleState::RunningDetached));
    }

    #[test]
    fn test_from_terminal() {
        assert_eq!(
            LifecycleState::from_terminal(JobStatus::Killed),
            LifecycleState::Killed
        );
        assert_eq!(
            LifecycleState::from_terminal(JobStatus::Unknown),
            LifecycleState::Unknown
        );
    }

    #[test]
    fn test_serde_uses_screaming_case() {
        let json = serde_json::to_string(&LifecycleState::RunningDetached).unwrap();
        assert_eq!(json, "\"RUNNING_DETACHED\"");
    }
}
