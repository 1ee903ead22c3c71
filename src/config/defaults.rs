//! Built-in lane defaults
//!
//! Values applied when neither the job file nor the caller sets them.

use std::time::Duration;

/// Submission tool invoked when the job does not name one.
pub const DEFAULT_BINARY: &str = "spark-submit";

/// Job name when none is configured.
pub const DEFAULT_NAME: &str = "arrow-spark";

/// Master used when the job carries no cluster connection.
pub const DEFAULT_MASTER: &str = "yarn";

/// Binary used to kill YARN applications.
pub const YARN_BINARY: &str = "yarn";

/// Seconds between driver status queries in detached mode.
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 1;

/// Consecutive failed status queries tolerated before giving up.
pub const DEFAULT_MAX_MISSED_REPORTS: u32 = 10;

/// Transcript capacity per submission (1 MiB).
pub const DEFAULT_OUTPUT_CAPACITY_BYTES: usize = 1024 * 1024;

/// Grace period between SIGTERM and a hard kill.
pub const DEFAULT_TERMINATION_GRACE_SECONDS: u64 = 10;

/// Deadline for one status query or remote kill command.
pub const DEFAULT_COMMAND_TIMEOUT_SECONDS: u64 = 30;

/// Runtime settings for the lane itself, independent of any one job.
#[derive(Debug, Clone)]
pub struct LaneSettings {
    /// Consecutive status query failures tolerated before the poll ends UNKNOWN.
    pub max_missed_reports: u32,

    /// Byte budget for the captured transcript; oldest lines are evicted.
    pub output_capacity_bytes: usize,

    /// Time a signalled child gets to exit before it is killed outright.
    pub termination_grace: Duration,

    /// Deadline for short tool commands; an overdue status query counts as
    /// a missed report.
    pub command_timeout: Duration,
}

impl Default for LaneSettings {
    fn default() -> Self {
        Self {
            max_missed_reports: DEFAULT_MAX_MISSED_REPORTS,
            output_capacity_bytes: DEFAULT_OUTPUT_CAPACITY_BYTES,
            termination_grace: Duration::from_secs(DEFAULT_TERMINATION_GRACE_SECONDS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECONDS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = LaneSettings::default();
        assert_eq!(settings.max_missed_reports, 10);
        assert_eq!(settings.output_capacity_bytes, 1_048_576);
        assert_eq!(settings.termination_grace, Duration::from_secs(10));
        assert_eq!(settings.command_timeout, Duration::from_secs(30));
    }
}
