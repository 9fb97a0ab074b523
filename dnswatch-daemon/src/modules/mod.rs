//! Daemon modules.
//!
//! A module is a [`DynPipeline`] registered under a name. The
//! [`ModuleRegistry`] owns every module and drives their lifecycle.

pub mod query_pipeline;

use dnswatch_core::pipeline::{DynPipeline, HealthStatus};

use crate::health::ModuleHealth;

/// A registered module and its lifecycle flags.
pub struct ModuleHandle {
    /// Name used in logs and health reports.
    pub name: String,
    /// Disabled modules are registered for reporting but never started.
    pub enabled: bool,
    /// Lifecycle implementation.
    pub pipeline: Box<dyn DynPipeline>,
    running: bool,
}

impl ModuleHandle {
    /// Wrap a pipeline under `name`.
    pub fn new(name: impl Into<String>, enabled: bool, pipeline: Box<dyn DynPipeline>) -> Self {
        Self {
            name: name.into(),
            enabled,
            pipeline,
            running: false,
        }
    }

    /// Whether `start` succeeded and `stop` has not been called since.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Module health. A disabled module is reported as `Healthy`.
    pub async fn health_check(&self) -> HealthStatus {
        if self.enabled {
            self.pipeline.health_check().await
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Ordered set of daemon modules.
///
/// Modules start in registration order and stop in reverse. Only modules
/// that actually started are stopped, so a partial startup can be rolled
/// back with [`ModuleRegistry::stop_all`].
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<ModuleHandle>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a module.
    pub fn register(&mut self, handle: ModuleHandle) {
        tracing::debug!(module = %handle.name, enabled = handle.enabled, "module registered");
        self.modules.push(handle);
    }

    /// Start every enabled module, stopping at the first failure.
    pub async fn start_all(&mut self) -> anyhow::Result<()> {
        for handle in self.modules.iter_mut().filter(|h| h.enabled) {
            tracing::info!(module = %handle.name, "starting module");
            if let Err(e) = handle.pipeline.start().await {
                return Err(anyhow::anyhow!(
                    "failed to start module '{}': {}",
                    handle.name,
                    e
                ));
            }
            handle.running = true;
        }
        Ok(())
    }

    /// Stop every running module in reverse order.
    ///
    /// All modules are attempted; failures are collected into one error.
    pub async fn stop_all(&mut self) -> anyhow::Result<()> {
        let mut failures = Vec::new();

        for handle in self.modules.iter_mut().rev().filter(|h| h.running) {
            tracing::info!(module = %handle.name, "stopping module");
            handle.running = false;
            if let Err(e) = handle.pipeline.stop().await {
                tracing::error!(module = %handle.name, error = %e, "module did not stop cleanly");
                failures.push(format!("{}: {}", handle.name, e));
            }
        }

        match failures.is_empty() {
            true => Ok(()),
            false => Err(anyhow::anyhow!("errors stopping modules: {}", failures.join("; "))),
        }
    }

    /// Health of every registered module, in registration order.
    pub async fn health(&self) -> Vec<ModuleHealth> {
        let mut reports = Vec::with_capacity(self.modules.len());
        for handle in &self.modules {
            reports.push(ModuleHealth {
                name: handle.name.clone(),
                enabled: handle.enabled,
                status: handle.health_check().await,
            });
        }
        reports
    }

    /// Registered modules.
    pub fn count(&self) -> usize {
        self.modules.len()
    }

    /// Enabled modules.
    pub fn enabled_count(&self) -> usize {
        self.modules.iter().filter(|m| m.enabled).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use dnswatch_core::error::{DnswatchError, PipelineError};
    use dnswatch_core::pipeline::Pipeline;

    /// Records lifecycle calls into a shared log.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_start: bool,
        status: HealthStatus,
    }

    impl Recorder {
        fn boxed(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Box<Self> {
            Box::new(Self {
                name,
                log: Arc::clone(log),
                fail_start: false,
                status: HealthStatus::Healthy,
            })
        }
    }

    impl Pipeline for Recorder {
        async fn start(&mut self) -> Result<(), DnswatchError> {
            self.log.lock().unwrap().push(format!("start {}", self.name));
            if self.fail_start {
                return Err(PipelineError::InitFailed("boom".to_owned()).into());
            }
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), DnswatchError> {
            self.log.lock().unwrap().push(format!("stop {}", self.name));
            Ok(())
        }

        async fn health_check(&self) -> HealthStatus {
            self.status.clone()
        }
    }

    #[tokio::test]
    async fn starts_in_order_and_stops_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::new();
        registry.register(ModuleHandle::new("a", true, Recorder::boxed("a", &log)));
        registry.register(ModuleHandle::new("b", true, Recorder::boxed("b", &log)));

        registry.start_all().await.unwrap();
        registry.stop_all().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start a", "start b", "stop b", "stop a"]
        );
    }

    #[tokio::test]
    async fn disabled_modules_are_skipped_and_healthy() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut recorder = Recorder::boxed("off", &log);
        recorder.status = HealthStatus::Unhealthy("never started".to_owned());

        let mut registry = ModuleRegistry::new();
        registry.register(ModuleHandle::new("off", false, recorder));
        registry.start_all().await.unwrap();

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.enabled_count(), 0);
        assert!(registry.health().await[0].status.is_healthy());
    }

    #[tokio::test]
    async fn rollback_stops_only_started_modules() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bad = Recorder::boxed("b", &log);
        bad.fail_start = true;

        let mut registry = ModuleRegistry::new();
        registry.register(ModuleHandle::new("a", true, Recorder::boxed("a", &log)));
        registry.register(ModuleHandle::new("b", true, bad));
        registry.register(ModuleHandle::new("c", true, Recorder::boxed("c", &log)));

        assert!(registry.start_all().await.is_err());
        registry.stop_all().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["start a", "start b", "stop a"]);
    }

    #[tokio::test]
    async fn start_failure_names_the_module() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut recorder = Recorder::boxed("bad", &log);
        recorder.fail_start = true;

        let mut registry = ModuleRegistry::new();
        registry.register(ModuleHandle::new("bad", true, recorder));

        let err = registry.start_all().await.unwrap_err();
        assert!(err.to_string().contains("'bad'"));
    }
}
