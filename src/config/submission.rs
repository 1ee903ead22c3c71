//! Submission configuration (job.toml)
//!
//! Example:
//!
//! ```toml
//! application = "hdfs:///jobs/etl.jar"
//! java_class = "com.example.Etl"
//! application_args = ["--date", "2024-01-01"]
//! executor_memory = "2G"
//! num_executors = 3
//! packages = "org.a:b:1.0,org.c:d:2.0"
//!
//! [cluster]
//! master = "spark://master:7077"
//! deploy_mode = "cluster"
//!
//! [conf]
//! "spark.sql.shuffle.partitions" = 200
//!
//! [env_vars]
//! HADOOP_CONF_DIR = "/etc/hadoop/conf"
//! ```

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use spark_status::ClusterManager;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::defaults::{DEFAULT_MASTER, DEFAULT_NAME, DEFAULT_POLL_INTERVAL_SECONDS};

/// Error types for config operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("No application configured: 'application' must name the jar or script to run")]
    MissingApplication,

    #[error("env_vars are only forwarded in cluster mode on YARN or Kubernetes")]
    EnvVarsUnsupported,

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Where the driver runs relative to the submitting process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    Client,
    Cluster,
}

impl DeployMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Cluster => "cluster",
        }
    }
}

/// Cluster connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterConfig {
    /// `--master` URL (`yarn`, `spark://host:7077`, `k8s://...`, `local[*]`)
    pub master: String,

    /// `--deploy-mode`; tool default applies when unset
    pub deploy_mode: Option<DeployMode>,

    /// YARN queue
    pub queue: Option<String>,

    /// Kubernetes namespace
    pub namespace: Option<String>,

    /// Spark installation; the binary is resolved under `<spark_home>/bin`
    pub spark_home: Option<PathBuf>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            master: DEFAULT_MASTER.to_string(),
            deploy_mode: None,
            queue: None,
            namespace: None,
            spark_home: None,
        }
    }
}

impl ClusterConfig {
    pub fn manager(&self) -> ClusterManager {
        ClusterManager::from_master(&self.master)
    }

    /// Standalone cluster mode: the submit process exits once the driver is
    /// accepted, and the driver has to be tracked through status queries.
    pub fn tracks_driver_status(&self) -> bool {
        self.manager() == ClusterManager::Standalone
            && self.deploy_mode == Some(DeployMode::Cluster)
    }
}

/// Launch parameters for one job.
///
/// Built once by the caller and only ever borrowed by the lane.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubmissionConfig {
    /// Jar or Python file to run
    pub application: String,

    /// Arguments passed to the application, verbatim
    pub application_args: Vec<String>,

    /// Main class (`--class`); also identifies the application when
    /// `application` is empty
    pub java_class: Option<String>,

    /// Job name (`--name`)
    pub name: String,

    /// Submission tool; `spark-submit` when unset
    pub binary: Option<String>,

    /// Pass `--verbose`
    pub verbose: bool,

    pub executor_memory: Option<String>,
    pub driver_memory: Option<String>,
    pub executor_cores: Option<u32>,
    pub total_executor_cores: Option<u32>,
    pub num_executors: Option<u32>,

    // Comma-separated lists, handed to the tool unsplit.
    pub files: Option<String>,
    pub py_files: Option<String>,
    pub archives: Option<String>,
    pub driver_class_path: Option<String>,
    pub jars: Option<String>,
    pub packages: Option<String>,
    pub exclude_packages: Option<String>,
    pub repositories: Option<String>,

    pub keytab: Option<String>,
    pub principal: Option<String>,
    pub proxy_user: Option<String>,

    /// Arbitrary `--conf` entries in declared order; duplicates are kept
    #[serde(deserialize_with = "ordered_pairs")]
    pub conf: Vec<(String, String)>,

    /// Environment overlay for the submit process, in declared order
    #[serde(deserialize_with = "ordered_pairs")]
    pub env_vars: Vec<(String, String)>,

    /// Seconds between status queries for detached drivers
    pub status_poll_interval: u64,

    pub cluster: ClusterConfig,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            application: String::new(),
            application_args: Vec::new(),
            java_class: None,
            name: DEFAULT_NAME.to_string(),
            binary: None,
            verbose: false,
            executor_memory: None,
            driver_memory: None,
            executor_cores: None,
            total_executor_cores: None,
            num_executors: None,
            files: None,
            py_files: None,
            archives: None,
            driver_class_path: None,
            jars: None,
            packages: None,
            exclude_packages: None,
            repositories: None,
            keytab: None,
            principal: None,
            proxy_user: None,
            conf: Vec::new(),
            env_vars: Vec::new(),
            status_poll_interval: DEFAULT_POLL_INTERVAL_SECONDS,
            cluster: ClusterConfig::default(),
        }
    }
}

impl SubmissionConfig {
    /// Config for `application` with every other field at its default.
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            ..Default::default()
        }
    }

    /// Load and parse config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    /// Parse config from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: SubmissionConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.has_application() {
            return Err(ConfigError::MissingApplication);
        }

        if self.cluster.master.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "'cluster.master' cannot be empty".to_string(),
            ));
        }

        if self.status_poll_interval == 0 {
            return Err(ConfigError::ValidationError(
                "'status_poll_interval' must be at least 1 second".to_string(),
            ));
        }

        if is_set(&self.keytab) && !is_set(&self.principal) {
            return Err(ConfigError::ValidationError(
                "'keytab' requires 'principal'".to_string(),
            ));
        }

        for (key, _) in self.conf.iter().chain(self.env_vars.iter()) {
            if key.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "conf and env_vars keys cannot be empty".to_string(),
                ));
            }
        }

        if !self.env_vars.is_empty()
            && self.cluster.deploy_mode == Some(DeployMode::Cluster)
            && !matches!(
                self.cluster.manager(),
                ClusterManager::Yarn | ClusterManager::Kubernetes
            )
        {
            return Err(ConfigError::EnvVarsUnsupported);
        }

        Ok(())
    }

    /// True when a primary resource is set. `java_class` only selects the
    /// entry point inside it; the submit tool rejects a run without one.
    pub fn has_application(&self) -> bool {
        !self.application.trim().is_empty()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_interval)
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Scalar accepted as a conf or env value.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScalarValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Deserialize a table into key/value pairs, keeping document order.
fn ordered_pairs<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct PairsVisitor;

    impl<'de> Visitor<'de> for PairsVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a table of scalar values")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry::<String, ScalarValue>()? {
                pairs.push((key, value.to_string()));
            }
            Ok(pairs)
        }
    }

    deserializer.deserialize_map(PairsVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = SubmissionConfig::from_str(r#"application = "job.jar""#).unwrap();

        assert_eq!(config.application, "job.jar");
        assert_eq!(config.name, "arrow-spark");
        assert_eq!(config.binary, None);
        assert_eq!(config.cluster.master, "yarn");
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(config.conf.is_empty());
    }

    #[test]
    fn test_parse_full_config_keeps_declared_order() {
        let toml = r#"
application = "hdfs:///jobs/etl.jar"
java_class = "com.example.Etl"
application_args = ["--date", "2024-01-01"]
executor_memory = "2G"
num_executors = 3
packages = "org.a:b:1.0,org.c:d:2.0"
verbose = true

[cluster]
master = "spark://master:7077"
deploy_mode = "client"

[conf]
"spark.z.last" = "1"
"spark.a.first" = 2
"spark.dynamicAllocation.enabled" = true

[env_vars]
ZZ = "1"
AA = "2"
"#;
        let config = SubmissionConfig::from_str(toml).unwrap();

        assert_eq!(config.java_class.as_deref(), Some("com.example.Etl"));
        assert_eq!(config.num_executors, Some(3));
        assert_eq!(config.cluster.deploy_mode, Some(DeployMode::Client));
        assert_eq!(
            config.conf,
            vec![
                ("spark.z.last".to_string(), "1".to_string()),
                ("spark.a.first".to_string(), "2".to_string()),
                ("spark.dynamicAllocation.enabled".to_string(), "true".to_string()),
            ]
        );
        assert_eq!(config.env_vars[0].0, "ZZ");
        assert_eq!(config.env_vars[1].0, "AA");
    }

    #[test]
    fn test_missing_application_rejected() {
        let err = SubmissionConfig::from_str(r#"name = "nothing""#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApplication));
    }

    #[test]
    fn test_java_class_alone_is_not_an_application() {
        let config = SubmissionConfig {
            java_class: Some("org.apache.spark.examples.SparkPi".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingApplication)
        ));

        let config = SubmissionConfig {
            java_class: Some("org.apache.spark.examples.SparkPi".to_string()),
            ..SubmissionConfig::new("local:///opt/spark/examples/jars/spark-examples.jar")
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = SubmissionConfig::from_str("application = \"a.jar\"\nexecutor_memroy = \"2G\"")
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_unknown_deploy_mode_rejected() {
        let toml = "application = \"a.jar\"\n[cluster]\ndeploy_mode = \"sideways\"";
        assert!(matches!(
            SubmissionConfig::from_str(toml).unwrap_err(),
            ConfigError::ParseError(_)
        ));
    }

    #[test]
    fn test_keytab_requires_principal() {
        let config = SubmissionConfig {
            keytab: Some("/etc/security/user.keytab".to_string()),
            ..SubmissionConfig::new("job.jar")
        };
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = SubmissionConfig {
            status_poll_interval: 0,
            ..SubmissionConfig::new("job.jar")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_vars_rejected_in_standalone_cluster_mode() {
        let config = SubmissionConfig {
            env_vars: vec![("A".to_string(), "1".to_string())],
            cluster: ClusterConfig {
                master: "spark://master:7077".to_string(),
                deploy_mode: Some(DeployMode::Cluster),
                ..Default::default()
            },
            ..SubmissionConfig::new("job.jar")
        };
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::EnvVarsUnsupported
        ));
    }

    #[test]
    fn test_tracks_driver_status_only_in_standalone_cluster_mode() {
        let mut cluster = ClusterConfig {
            master: "spark://master:7077".to_string(),
            deploy_mode: Some(DeployMode::Cluster),
            ..Default::default()
        };
        assert!(cluster.tracks_driver_status());

        cluster.deploy_mode = Some(DeployMode::Client);
        assert!(!cluster.tracks_driver_status());

        cluster.master = "yarn".to_string();
        cluster.deploy_mode = Some(DeployMode::Cluster);
        assert!(!cluster.tracks_driver_status());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.toml");
        fs::write(&path, "application = \"job.py\"\npy_files = \"deps.zip\"").unwrap();

        let config = SubmissionConfig::from_file(&path).unwrap();
        assert_eq!(config.py_files.as_deref(), Some("deps.zip"));

        let missing = SubmissionConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::IoError(_)));
    }
}
