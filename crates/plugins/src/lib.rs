//! Built-in plugins and the default registry.
//!
//! | role      | kinds |
//! |-----------|-------|
//! | collector | `constant`, `sequence`, `http` |
//! | storage   | `memory`, `jsonl` |
//! | detector  | `threshold`, `percent_change`, `missing_data` |
//! | alerter   | `log`, `webhook` |
//!
//! State that must outlive one pipeline invocation (the in-memory store and
//! the webhook cooldown ledger) is captured by the factories registered here.

pub mod alerters;
pub mod collectors;
pub mod detectors;
pub mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use pulse_core::{Alerter, Collector, Detector, Params, PluginRegistry, RegistryError, Storage};

use alerters::{CooldownLedger, LogAlerter, WebhookAlerter};
use collectors::{ConstantCollector, HttpCollector, SequenceCollector};
use detectors::{MissingDataDetector, PercentChangeDetector, ThresholdDetector};
use storage::{JsonlStorage, MemoryStorage, MemoryStore};

/// Options captured by the built-in factories.
#[derive(Debug, Clone)]
pub struct BuiltinOptions {
    /// Root directory for the `jsonl` storage when its params omit `path`.
    pub data_dir: PathBuf,
}

impl Default for BuiltinOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Register every built-in plugin into `registry`.
pub fn register_builtins(registry: &mut PluginRegistry, options: BuiltinOptions) -> Result<(), RegistryError> {
    // ── Collectors ──────────────────────────────────────────────────
    registry.register_collector("constant", |params: &Params| {
        Ok(Box::new(ConstantCollector::from_params(params)?) as Box<dyn Collector>)
    })?;
    registry.register_collector("sequence", |params: &Params| {
        Ok(Box::new(SequenceCollector::from_params(params)?) as Box<dyn Collector>)
    })?;
    registry.register_collector("http", |params: &Params| {
        Ok(Box::new(HttpCollector::from_params(params)?) as Box<dyn Collector>)
    })?;

    // ── Storages ────────────────────────────────────────────────────
    let store = Arc::new(MemoryStore::new());
    registry.register_storage("memory", move |_: &Params| {
        Ok(Box::new(MemoryStorage::new(store.clone())) as Box<dyn Storage>)
    })?;
    let data_dir = options.data_dir;
    registry.register_storage("jsonl", move |params: &Params| {
        Ok(Box::new(JsonlStorage::from_params(&data_dir, params)?) as Box<dyn Storage>)
    })?;

    // ── Detectors ───────────────────────────────────────────────────
    registry.register_detector("threshold", |_: Option<Arc<dyn Storage>>, params: &Params| {
        Ok(Box::new(ThresholdDetector::from_params(params)?) as Box<dyn Detector>)
    })?;
    registry.register_detector("percent_change", |storage: Option<Arc<dyn Storage>>, params: &Params| {
        Ok(Box::new(PercentChangeDetector::from_params(storage, params)?) as Box<dyn Detector>)
    })?;
    registry.register_detector("missing_data", |_: Option<Arc<dyn Storage>>, params: &Params| {
        Ok(Box::new(MissingDataDetector::from_params(params)?) as Box<dyn Detector>)
    })?;

    // ── Alerters ────────────────────────────────────────────────────
    registry.register_alerter("log", |params: &Params| {
        Ok(Box::new(LogAlerter::from_params(params)?) as Box<dyn Alerter>)
    })?;
    let ledger = Arc::new(CooldownLedger::new());
    registry.register_alerter("webhook", move |params: &Params| {
        Ok(Box::new(WebhookAlerter::from_params(ledger.clone(), params)?) as Box<dyn Alerter>)
    })?;

    Ok(())
}

/// A fresh registry holding every built-in plugin.
pub fn builtin_registry(options: BuiltinOptions) -> Result<PluginRegistry, RegistryError> {
    let mut registry = PluginRegistry::new();
    register_builtins(&mut registry, options)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulse_core::{DataPoint, PluginRole, Window};

    #[test]
    fn registers_every_builtin() {
        let registry = builtin_registry(BuiltinOptions::default()).unwrap();
        assert_eq!(registry.kinds(PluginRole::Collector), vec!["constant", "http", "sequence"]);
        assert_eq!(registry.kinds(PluginRole::Storage), vec!["jsonl", "memory"]);
        assert_eq!(
            registry.kinds(PluginRole::Detector),
            vec!["missing_data", "percent_change", "threshold"]
        );
        assert_eq!(registry.kinds(PluginRole::Alerter), vec!["log", "webhook"]);
    }

    #[test]
    fn registering_twice_fails() {
        let mut registry = builtin_registry(BuiltinOptions::default()).unwrap();
        assert!(register_builtins(&mut registry, BuiltinOptions::default()).is_err());
    }

    #[tokio::test]
    async fn memory_instances_share_state() {
        let registry = builtin_registry(BuiltinOptions::default()).unwrap();
        let first = registry.create_storage("memory", &Params::new()).unwrap();
        let second = registry.create_storage("memory", &Params::new()).unwrap();

        let now = Utc::now();
        first.save_datapoint("m", &DataPoint::new(now, 1.0)).await.unwrap();
        let seen = second.query_datapoints("m", &Window::Points(5), now).await.unwrap();
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn jsonl_uses_configured_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let registry = builtin_registry(BuiltinOptions {
            data_dir: dir.path().to_path_buf(),
        })
        .unwrap();
        let storage = registry.create_storage("jsonl", &Params::new()).unwrap();
        storage.save_datapoint("m", &DataPoint::new(Utc::now(), 2.0)).await.unwrap();
        assert!(dir.path().join("datapoints.jsonl").exists());
    }
}
