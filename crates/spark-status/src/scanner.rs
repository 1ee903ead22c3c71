//! spark-submit output scanning.
//!
//! The submit tool reports the identifiers needed to track or kill a job only
//! in its log output. Which identifier matters depends on the cluster
//! manager:
//! - YARN: `application_<cluster ts>_<seq>`
//! - Kubernetes: the driver pod name and, once it finishes, its exit code
//! - standalone cluster mode: `driver-<timestamp>-<seq>`
//!
//! Status queries (`--status <driver id>`) print a `SubmissionStatusResponse`
//! JSON body, handled by [`StatusReport::parse`].

use regex_lite::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::error::ScanError;
use crate::state::DriverState;

/// Cluster manager family, derived from the `--master` URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterManager {
    Yarn,
    Kubernetes,
    Standalone,
    Mesos,
    Local,
}

impl ClusterManager {
    pub fn from_master(master: &str) -> Self {
        let master = master.trim();
        if master.starts_with("yarn") {
            Self::Yarn
        } else if master.starts_with("k8s://") {
            Self::Kubernetes
        } else if master.starts_with("spark://") {
            Self::Standalone
        } else if master.starts_with("mesos://") {
            Self::Mesos
        } else {
            Self::Local
        }
    }
}

/// An identifier or exit report found in one output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// Standalone driver id (`driver-20240101120000-0001`).
    DriverId(String),
    /// YARN application id.
    ApplicationId(String),
    /// Kubernetes driver pod name.
    DriverPod(String),
    /// Exit code reported for the Kubernetes driver container.
    ExitCode(i32),
}

fn application_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(application[0-9_]+)").expect("application id pattern"))
}

fn driver_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(driver-[0-9\-]+)").expect("driver id pattern"))
}

fn pod_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\s*pod name: ((.+?)-([a-z0-9]+)-driver)").expect("pod name pattern")
    })
}

fn exit_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*[eE]xit code: (\d+)").expect("exit code pattern"))
}

fn driver_state_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""driverState"\s*:\s*"([A-Za-z_]+)""#).expect("driver state pattern")
    })
}

/// Line scanner bound to one cluster manager.
#[derive(Debug, Clone, Copy)]
pub struct OutputScanner {
    manager: ClusterManager,
    track_driver: bool,
}

impl OutputScanner {
    /// `track_driver` enables standalone driver id capture (cluster deploy mode).
    pub fn new(manager: ClusterManager, track_driver: bool) -> Self {
        Self {
            manager,
            track_driver,
        }
    }

    pub fn manager(&self) -> ClusterManager {
        self.manager
    }

    /// Scan a single output line.
    pub fn scan_line(&self, line: &str) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        let line = line.trim();

        match self.manager {
            ClusterManager::Yarn => {
                if let Some(caps) = application_re().captures(line) {
                    events.push(OutputEvent::ApplicationId(caps[1].to_string()));
                }
            }
            ClusterManager::Kubernetes => {
                if let Some(caps) = pod_re().captures(line) {
                    events.push(OutputEvent::DriverPod(caps[1].to_string()));
                }
                if let Some(code) = exit_code_re()
                    .captures(line)
                    .and_then(|caps| caps[1].parse::<i32>().ok())
                {
                    events.push(OutputEvent::ExitCode(code));
                }
            }
            _ => {}
        }

        if self.track_driver && line.contains("driverId") {
            if let Some(caps) = driver_id_re().captures(line) {
                events.push(OutputEvent::DriverId(caps[1].to_string()));
            }
        }

        events
    }
}

/// Parsed result of one driver status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub state: DriverState,
    pub message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionStatusResponse {
    driver_state: String,
    #[serde(default)]
    message: Option<String>,
}

impl StatusReport {
    /// Parse the output of a `--status` invocation or a REST status body.
    ///
    /// The embedded JSON object is preferred; otherwise the first
    /// `"driverState" : "X"` line wins.
    pub fn parse(output: &str) -> Result<Self, ScanError> {
        if let (Some(start), Some(end)) = (output.find('{'), output.rfind('}')) {
            if start < end {
                if let Ok(body) =
                    serde_json::from_str::<SubmissionStatusResponse>(&output[start..=end])
                {
                    return Ok(Self {
                        state: body.driver_state.parse()?,
                        message: body.message.filter(|m| !m.is_empty()),
                    });
                }
            }
        }

        let caps = driver_state_re()
            .captures(output)
            .ok_or(ScanError::MissingDriverState)?;
        Ok(Self {
            state: caps[1].parse()?,
            message: None,
        })
    }
}
