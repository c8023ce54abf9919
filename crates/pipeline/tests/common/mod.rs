//! Mock plugins that count their invocations.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use pulse_core::{
    AlertOutcome, Alerter, CleanupCounts, Collector, DataPoint, DetectionRecord, DetectionResult,
    Detector, Params, PluginError, PluginRegistry, RetentionPolicy, Storage, Window,
};

fn flag(params: &Params, key: &str) -> bool {
    params.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

#[derive(Clone, Default)]
pub struct Counters {
    pub collects: Arc<AtomicUsize>,
    pub collector_opens: Arc<AtomicUsize>,
    pub collector_closes: Arc<AtomicUsize>,
    pub storage_opens: Arc<AtomicUsize>,
    pub storage_closes: Arc<AtomicUsize>,
    pub saves: Arc<AtomicUsize>,
    pub alerts: Arc<AtomicUsize>,
    /// Detector ids in invocation order.
    pub detector_calls: Arc<Mutex<Vec<String>>>,
}

impl Counters {
    pub fn collects(&self) -> usize {
        self.collects.load(Ordering::SeqCst)
    }

    /// `(opened, closed)` collector instances.
    pub fn collector_lifecycle(&self) -> (usize, usize) {
        (
            self.collector_opens.load(Ordering::SeqCst),
            self.collector_closes.load(Ordering::SeqCst),
        )
    }

    /// `(opened, closed)` storage instances.
    pub fn storage_lifecycle(&self) -> (usize, usize) {
        (
            self.storage_opens.load(Ordering::SeqCst),
            self.storage_closes.load(Ordering::SeqCst),
        )
    }

    pub fn detector_calls(&self) -> Vec<String> {
        self.detector_calls.lock().unwrap().clone()
    }
}

// -- collector ---------------------------------------------------------

struct MockCollector {
    value: Option<f64>,
    fail: bool,
    counters: Counters,
}

#[async_trait::async_trait]
impl Collector for MockCollector {
    async fn collect(&self, at_time: DateTime<Utc>) -> Result<DataPoint, PluginError> {
        self.counters.collects.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PluginError::Collection("source unreachable".into()));
        }
        Ok(DataPoint::from_option(at_time, self.value))
    }

    async fn close(&self) -> Result<(), PluginError> {
        self.counters.collector_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// -- storage -----------------------------------------------------------

struct MockStorage {
    broken: bool,
    counters: Counters,
}

#[async_trait::async_trait]
impl Storage for MockStorage {
    async fn save_datapoint(&self, _metric: &str, _point: &DataPoint) -> Result<(), PluginError> {
        self.counters.saves.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(PluginError::Storage("disk full".into()));
        }
        Ok(())
    }

    async fn query_datapoints(&self, _: &str, _: &Window, _: DateTime<Utc>) -> Result<Vec<DataPoint>, PluginError> {
        Ok(Vec::new())
    }

    async fn save_detection(&self, _metric: &str, _record: &DetectionRecord) -> Result<(), PluginError> {
        if self.broken {
            return Err(PluginError::Storage("disk full".into()));
        }
        Ok(())
    }

    async fn query_detections(
        &self,
        _: &str,
        _: &Window,
        _: DateTime<Utc>,
    ) -> Result<Vec<DetectionRecord>, PluginError> {
        Ok(Vec::new())
    }

    async fn cleanup_old_data(&self, _: &RetentionPolicy, _: DateTime<Utc>) -> Result<CleanupCounts, PluginError> {
        Ok(CleanupCounts::default())
    }

    async fn close(&self) -> Result<(), PluginError> {
        self.counters.storage_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// -- detector ----------------------------------------------------------

struct MockDetector {
    tag: String,
    anomalous: bool,
    fail: bool,
    counters: Counters,
}

#[async_trait::async_trait]
impl Detector for MockDetector {
    async fn detect(
        &self,
        metric_name: &str,
        value: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<DetectionResult, PluginError> {
        self.counters.detector_calls.lock().unwrap().push(self.tag.clone());
        if self.fail {
            return Err(PluginError::Detection("boom".into()));
        }
        let mut result = DetectionResult::normal(metric_name, timestamp, value);
        if self.anomalous {
            result.is_anomaly = true;
            result.score = Some(1.0);
        }
        Ok(result)
    }
}

// -- alerter -----------------------------------------------------------

struct MockAlerter {
    skip: bool,
    counters: Counters,
}

#[async_trait::async_trait]
impl Alerter for MockAlerter {
    async fn send(&self, _result: &DetectionResult) -> Result<AlertOutcome, PluginError> {
        self.counters.alerts.fetch_add(1, Ordering::SeqCst);
        if self.skip {
            return Ok(AlertOutcome::Skipped {
                reason: "cooldown".into(),
            });
        }
        Ok(AlertOutcome::Sent)
    }

    fn channel_name(&self) -> &str {
        "mock"
    }
}

/// A registry with every plugin registered under the key `mock`.
///
/// Params: collector `value` / `fail`; storage `broken`; detector `tag`,
/// `anomalous`, `fail`; alerter `skip`.
pub fn mock_registry() -> (PluginRegistry, Counters) {
    let counters = Counters::default();
    let mut registry = PluginRegistry::new();

    let c = counters.clone();
    registry
        .register_collector("mock", move |params: &Params| {
            c.collector_opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockCollector {
                value: params.get("value").and_then(|v| v.as_f64()),
                fail: flag(params, "fail"),
                counters: c.clone(),
            }) as Box<dyn Collector>)
        })
        .unwrap();

    let c = counters.clone();
    registry
        .register_storage("mock", move |params: &Params| {
            c.storage_opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockStorage {
                broken: flag(params, "broken"),
                counters: c.clone(),
            }) as Box<dyn Storage>)
        })
        .unwrap();

    let c = counters.clone();
    registry
        .register_detector("mock", move |_: Option<Arc<dyn Storage>>, params: &Params| {
            Ok(Box::new(MockDetector {
                tag: params.get("tag").and_then(|v| v.as_str()).unwrap_or("?").to_string(),
                anomalous: flag(params, "anomalous"),
                fail: flag(params, "fail"),
                counters: c.clone(),
            }) as Box<dyn Detector>)
        })
        .unwrap();

    let c = counters.clone();
    registry
        .register_alerter("mock", move |params: &Params| {
            Ok(Box::new(MockAlerter {
                skip: flag(params, "skip"),
                counters: c.clone(),
            }) as Box<dyn Alerter>)
        })
        .unwrap();

    (registry, counters)
}
