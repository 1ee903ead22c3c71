//! Job configuration
//!
//! A job is described once, up front, by a [`SubmissionConfig`]. Values are
//! fully resolved before they reach the lane; nothing here substitutes or
//! rewrites them.

mod defaults;
mod submission;

pub use defaults::{
    LaneSettings, DEFAULT_BINARY, DEFAULT_COMMAND_TIMEOUT_SECONDS, DEFAULT_MASTER, DEFAULT_MAX_MISSED_REPORTS, DEFAULT_NAME,
    DEFAULT_OUTPUT_CAPACITY_BYTES, DEFAULT_POLL_INTERVAL_SECONDS,
    DEFAULT_TERMINATION_GRACE_SECONDS, YARN_BINARY,
};
pub use submission::{ClusterConfig, ConfigError, DeployMode, SubmissionConfig};
