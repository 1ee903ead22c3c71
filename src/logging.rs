//! Log subscriber setup for the CLI
//!
//! Logs go to stderr; stdout is reserved for command output. The filter
//! comes from `SPARK_LANE_LOG` (EnvFilter syntax) when set, otherwise
//! `info`, or `debug` with `--verbose`. `SPARK_LANE_LOG_FORMAT=json` switches
//! to JSON lines.

use std::env;
use std::io;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "SPARK_LANE_LOG";
pub const LOG_FORMAT_ENV: &str = "SPARK_LANE_LOG_FORMAT";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LogFormat {
    Json,
    Compact,
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(verbose: bool) {
    let filter = build_filter(env::var(LOG_ENV).ok(), verbose);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    let _ = match parse_format(env::var(LOG_FORMAT_ENV).ok()) {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
}

fn build_filter(directives: Option<String>, verbose: bool) -> EnvFilter {
    match directives.filter(|value| !value.trim().is_empty()) {
        Some(value) => EnvFilter::new(value),
        None if verbose => EnvFilter::new("debug"),
        None => EnvFilter::new("info"),
    }
}

fn parse_format(value: Option<String>) -> LogFormat {
    match value
        .as_deref()
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => LogFormat::Json,
        _ => LogFormat::Compact,
    }
}
