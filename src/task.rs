//! Submit task and hook
//!
//! [`SubmitTask`] is what an orchestrator holds: it knows which application
//! to run and hands the work to a [`SubmitHook`]. The hook is built up front
//! and passed in, so tests and embedders can substitute their own.

use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::config::{LaneSettings, SubmissionConfig};
use crate::error::LaneError;
use crate::lifecycle::{LifecycleController, SubmissionReport};

/// Contract between a task and whatever performs the submission.
pub trait SubmitHook: Send + Sync {
    /// Run the full build, launch and poll cycle for `application`. Blocks.
    fn submit(&self, application: &str) -> Result<SubmissionReport, LaneError>;

    /// Cancel the submission in flight. A no-op when there is none.
    fn on_kill(&self);
}

type ControllerFactory = dyn Fn() -> LifecycleController + Send + Sync;

/// Hook that runs each submission on a fresh [`LifecycleController`].
pub struct LifecycleHook {
    config: SubmissionConfig,
    factory: Box<ControllerFactory>,
    current: Mutex<Option<Arc<LifecycleController>>>,
}

impl LifecycleHook {
    pub fn new<F>(config: SubmissionConfig, factory: F) -> Self
    where
        F: Fn() -> LifecycleController + Send + Sync + 'static,
    {
        Self {
            config,
            factory: Box::new(factory),
            current: Mutex::new(None),
        }
    }

    /// Hook using the default collaborators for every attempt.
    pub fn with_settings(config: SubmissionConfig, settings: LaneSettings) -> Self {
        Self::new(config, move || LifecycleController::from_settings(&settings))
    }

    pub fn config(&self) -> &SubmissionConfig {
        &self.config
    }

    /// Controller of the most recent attempt.
    pub fn current(&self) -> Option<Arc<LifecycleController>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SubmitHook for LifecycleHook {
    fn submit(&self, application: &str) -> Result<SubmissionReport, LaneError> {
        let mut config = self.config.clone();
        if !application.is_empty() {
            config.application = application.to_string();
        }

        let controller = Arc::new((self.factory)());
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&controller));
        controller.execute(&config)
    }

    fn on_kill(&self) {
        match self.current() {
            Some(controller) => {
                if controller.state().is_terminal() {
                    debug!("on_kill after the submission finished, ignoring");
                } else {
                    info!(state = %controller.state(), "killing submission");
                    controller.cancel();
                }
            }
            None => debug!("on_kill with no submission in flight"),
        }
    }
}

/// A submission as an orchestrator sees it.
pub struct SubmitTask {
    application: String,
    hook: Arc<dyn SubmitHook>,
}

impl SubmitTask {
    /// Task backed by a [`LifecycleHook`] over `config`.
    pub fn new(config: SubmissionConfig, settings: LaneSettings) -> Self {
        let application = config.application.clone();
        Self::with_hook(application, Arc::new(LifecycleHook::with_settings(config, settings)))
    }

    pub fn with_hook(application: impl Into<String>, hook: Arc<dyn SubmitHook>) -> Self {
        Self {
            application: application.into(),
            hook,
        }
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn hook(&self) -> Arc<dyn SubmitHook> {
        Arc::clone(&self.hook)
    }

    pub fn execute(&self) -> Result<SubmissionReport, LaneError> {
        self.hook.submit(&self.application)
    }

    pub fn on_kill(&self) {
        self.hook.on_kill();
    }
}
