//! Error types for status parsing.

use thiserror::Error;

/// Failure to extract a status report from submit-tool output.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    /// The output carried no `driverState` field at all.
    #[error("no driverState found in status output")]
    MissingDriverState,

    /// A `driverState` value outside the known vocabulary.
    #[error("unrecognized driver state: {0}")]
    UnknownDriverState(String),
}
