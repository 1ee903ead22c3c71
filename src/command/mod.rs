//! Command rendering
//!
//! Turns a [`SubmissionConfig`] into the exact argv and environment overlay
//! handed to the submit tool. Rendering is pure: the same config always
//! yields the same [`CommandSpec`].
//!
//! List-valued options (`--jars`, `--packages`, ...) are passed through as a
//! single value; the tool owns their syntax. Unset or empty options are left
//! out so the tool's own defaults apply.

mod mask;

pub use mask::{mask_command, MASK};

use serde::Serialize;
use spark_status::ClusterManager;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::{ConfigError, SubmissionConfig, DEFAULT_BINARY, YARN_BINARY};

pub(crate) const CONF_FLAG: &str = "--conf";

/// A fully rendered command line plus its environment overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    /// Program followed by its arguments
    pub argv: Vec<String>,

    /// Variables added on top of the inherited environment
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }

    /// Command line safe for logs.
    pub fn masked(&self) -> String {
        mask_command(&self.argv)
    }
}

/// Renders submit, status and kill commands.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    default_binary: String,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self::with_default_binary(DEFAULT_BINARY)
    }

    /// Builder falling back to `binary` when a job names no submit tool.
    pub fn with_default_binary(binary: impl Into<String>) -> Self {
        Self {
            default_binary: binary.into(),
        }
    }

    /// Render the submit command for `config`.
    pub fn build(&self, config: &SubmissionConfig) -> Result<CommandSpec, ConfigError> {
        config.validate()?;

        let cluster = &config.cluster;
        let manager = cluster.manager();
        let mut args = ArgList::new(self.resolve_binary(config));

        args.flag_value("--master", &cluster.master);

        for (key, value) in &config.conf {
            args.conf(key, value);
        }

        let env_template = match manager {
            ClusterManager::Yarn => Some("spark.yarn.appMasterEnv."),
            ClusterManager::Kubernetes => Some("spark.kubernetes.driverEnv."),
            _ => None,
        };
        if let Some(prefix) = env_template {
            for (key, value) in &config.env_vars {
                args.conf(&format!("{}{}", prefix, key), value);
            }
        }

        if manager == ClusterManager::Kubernetes {
            if let Some(namespace) = non_empty(&cluster.namespace) {
                args.conf("spark.kubernetes.namespace", namespace);
            }
        }

        args.option("--files", &config.files);
        args.option("--py-files", &config.py_files);
        args.option("--archives", &config.archives);
        args.option("--driver-class-path", &config.driver_class_path);
        args.option("--jars", &config.jars);
        args.option("--packages", &config.packages);
        args.option("--exclude-packages", &config.exclude_packages);
        args.option("--repositories", &config.repositories);
        args.number("--num-executors", config.num_executors);
        args.number("--total-executor-cores", config.total_executor_cores);
        args.number("--executor-cores", config.executor_cores);
        args.option("--executor-memory", &config.executor_memory);
        args.option("--driver-memory", &config.driver_memory);
        args.option("--keytab", &config.keytab);
        args.option("--principal", &config.principal);
        args.option("--proxy-user", &config.proxy_user);
        if !config.name.trim().is_empty() {
            args.flag_value("--name", &config.name);
        }
        args.option("--class", &config.java_class);
        if config.verbose {
            args.push("--verbose");
        }
        args.option("--queue", &cluster.queue);
        if let Some(mode) = cluster.deploy_mode {
            args.flag_value("--deploy-mode", mode.as_str());
        }

        args.push(&config.application);
        for arg in &config.application_args {
            args.push(arg);
        }

        // Kubernetes only sees the overlay through driverEnv confs.
        let env = if manager == ClusterManager::Kubernetes {
            BTreeMap::new()
        } else {
            env_overlay(config)
        };

        Ok(CommandSpec {
            argv: args.into_inner(),
            env,
        })
    }

    /// Render a one-shot status query for a standalone driver.
    pub fn status_command(&self, config: &SubmissionConfig, driver_id: &str) -> CommandSpec {
        let mut args = ArgList::new(self.resolve_binary(config));
        args.flag_value("--master", &config.cluster.master);
        args.flag_value("--status", driver_id);

        CommandSpec {
            argv: args.into_inner(),
            env: env_overlay(config),
        }
    }

    /// Render the command that stops a job on the cluster side.
    ///
    /// Standalone drivers are killed through the submit tool, YARN
    /// applications through `yarn application -kill`. Other managers have
    /// nothing to kill once the local process is gone.
    pub fn kill_command(
        &self,
        config: &SubmissionConfig,
        driver_id: Option<&str>,
        application_id: Option<&str>,
    ) -> Option<CommandSpec> {
        let args = match (config.cluster.manager(), driver_id, application_id) {
            (ClusterManager::Standalone, Some(driver_id), _) => {
                let mut args = ArgList::new(self.resolve_binary(config));
                args.flag_value("--master", &config.cluster.master);
                args.flag_value("--kill", driver_id);
                args
            }
            (ClusterManager::Yarn, _, Some(application_id)) => {
                let mut args = ArgList::new(YARN_BINARY.to_string());
                args.push("application");
                args.flag_value("-kill", application_id);
                args
            }
            _ => return None,
        };

        Some(CommandSpec {
            argv: args.into_inner(),
            env: env_overlay(config),
        })
    }

    fn resolve_binary(&self, config: &SubmissionConfig) -> String {
        let binary = config
            .binary
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .unwrap_or(&self.default_binary);

        match &config.cluster.spark_home {
            Some(home) if !Path::new(binary).is_absolute() => {
                home.join("bin").join(binary).to_string_lossy().into_owned()
            }
            _ => binary.to_string(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn env_overlay(config: &SubmissionConfig) -> BTreeMap<String, String> {
    config
        .env_vars
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

struct ArgList(Vec<String>);

impl ArgList {
    fn new(program: String) -> Self {
        Self(vec![program])
    }

    fn push(&mut self, arg: &str) {
        self.0.push(arg.to_string());
    }

    fn flag_value(&mut self, flag: &str, value: &str) {
        self.push(flag);
        self.push(value);
    }

    fn option(&mut self, flag: &str, value: &Option<String>) {
        if let Some(value) = non_empty(value) {
            self.flag_value(flag, value);
        }
    }

    fn number(&mut self, flag: &str, value: Option<u32>) {
        if let Some(value) = value {
            self.flag_value(flag, &value.to_string());
        }
    }

    fn conf(&mut self, key: &str, value: &str) {
        self.flag_value(CONF_FLAG, &format!("{}={}", key, value));
    }

    fn into_inner(self) -> Vec<String> {
        self.0
    }
}
