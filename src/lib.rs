//! spark-submit lane
//!
//! A submission lifecycle controller around `spark-submit`: renders a
//! validated command line from a job config, launches and tracks the submit
//! process, follows detached standalone-cluster drivers through status
//! polls, and carries cancellation through to the child process and the
//! cluster.

pub mod cancel;
pub mod command;
pub mod config;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod logging;
pub mod poll;
pub mod process;
pub mod signal;
pub mod task;

pub use cancel::CancelToken;
pub use command::{CommandBuilder, CommandSpec};
pub use config::{ClusterConfig, ConfigError, DeployMode, LaneSettings, SubmissionConfig};
pub use error::{LaneError, RuntimeFailure};
pub use handle::{HandleSnapshot, SubmissionHandle};
pub use lifecycle::{LifecycleController, LifecycleState, SubmissionReport};
pub use poll::{
    PollError, PollSequence, StatusPoller, StatusRequest, StatusSnapshot, StatusSource,
    SubmitToolStatusSource,
};
pub use process::{CommandError, LaunchError, LaunchOptions, ProcessController, TerminalStatus};
pub use spark_status::{ClusterManager, DriverState, JobStatus};
pub use task::{LifecycleHook, SubmitHook, SubmitTask};
