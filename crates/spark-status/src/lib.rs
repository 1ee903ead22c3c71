//! Spark submission status types
//!
//! Shared vocabulary between the submit lane and anything that reports on a
//! submitted job: driver states as printed by the standalone master, the
//! lane's own job status enum, and a scanner that pulls identifiers and
//! state reports out of `spark-submit` output.

pub mod error;
pub mod scanner;
pub mod state;

pub use error::ScanError;
pub use scanner::{ClusterManager, OutputEvent, OutputScanner, StatusReport};
pub use state::{DriverState, JobStatus};
