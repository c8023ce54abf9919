//! The pipeline orchestrator.
//!
//! One invocation runs load → collect → persist → detect → alert → record,
//! strictly in order. Configuration errors propagate; every other failure is
//! recorded in [`CheckResult::errors`] and the pipeline moves on, except a
//! failed collection, which ends the invocation with a degraded result.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn, Instrument};

use pulse_config::{ConfigError, ConfigLoader, DetectorConfig, MetricUnit, TemplateContext};
use pulse_core::{
    AlertOutcome, Alerter, CheckResult, CleanupCounts, DataPoint, DetectionRecord, DetectionResult,
    PluginError, PluginRegistry, Stage, StageFailure, StageResult, Storage,
};

use crate::source::ConfigSource;

/// Tables a storage with a schema must have before the first write.
pub const REQUIRED_TABLES: [&str; 2] = ["datapoints", "detections"];

/// Failures recorded during one invocation, in the order they happened.
#[derive(Debug, Default)]
struct ErrorLog {
    entries: Vec<String>,
}

impl ErrorLog {
    fn record(&mut self, failure: StageFailure) {
        warn!(stage = %failure.stage, error = %failure.message, "stage failed");
        self.entries.push(failure.message);
    }

    /// Keep the value on success, record the failure otherwise.
    fn note<T>(&mut self, result: StageResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(failure) => {
                self.record(failure);
                None
            }
        }
    }
}

/// Outcome of the alert stage for one detection.
#[derive(Debug, Clone, Default)]
struct AlertNote {
    sent: bool,
    reason: Option<String>,
}

/// Runs metric checks against plugins from an explicit registry.
pub struct Checker {
    registry: Arc<PluginRegistry>,
    loader: ConfigLoader,
}

impl Checker {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            registry,
            loader: ConfigLoader::new(),
        }
    }

    pub fn with_loader(mut self, loader: ConfigLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Load and validate a unit. Templates render only when `ctx` is given.
    pub fn load(&self, source: &ConfigSource, ctx: Option<TemplateContext>) -> Result<MetricUnit, ConfigError> {
        match source {
            ConfigSource::File(path) => self.loader.load_file(path, ctx),
            ConfigSource::Inline(yaml) => self.loader.load_str(yaml, ctx),
        }
    }

    /// Run one check. `execution_time` defaults to now.
    pub async fn execute(
        &self,
        source: &ConfigSource,
        execution_time: Option<DateTime<Utc>>,
    ) -> Result<CheckResult, ConfigError> {
        let execution_time = execution_time.unwrap_or_else(Utc::now);
        let unit = self.load(source, Some(TemplateContext::new(execution_time)))?;
        Ok(self.execute_unit(&unit, execution_time).await)
    }

    /// Run collect through record against an already-loaded unit.
    pub async fn execute_unit(&self, unit: &MetricUnit, execution_time: DateTime<Utc>) -> CheckResult {
        let span = tracing::info_span!("check", metric = %unit.name(), at = %execution_time);
        self.run_stages(unit, execution_time).instrument(span).await
    }

    async fn run_stages(&self, unit: &MetricUnit, execution_time: DateTime<Utc>) -> CheckResult {
        let started = Instant::now();
        let mut log = ErrorLog::default();

        // ── Collect ─────────────────────────────────────────────────
        let datapoint = match self.collect(unit, execution_time, &mut log).await {
            Ok(point) => point,
            Err(failure) => {
                let fatal = failure.stage.is_fatal();
                log.record(failure);
                if fatal {
                    info!(duration_ms = started.elapsed().as_millis() as u64, "check ended after failed collection");
                    return CheckResult {
                        metric_name: unit.name().to_string(),
                        execution_time,
                        datapoint: DataPoint::missing(execution_time),
                        detections: Vec::new(),
                        alert_sent: false,
                        alert_reason: None,
                        errors: log.entries,
                    };
                }
                DataPoint::missing(execution_time)
            }
        };
        debug!(value = ?datapoint.value, missing = datapoint.is_missing, "collected");

        // ── Persist ─────────────────────────────────────────────────
        let storage = self.persist(unit, &datapoint, &mut log).await;

        // ── Detect ──────────────────────────────────────────────────
        let detections = self.detect(unit, &datapoint, storage.as_ref(), &mut log).await;

        // ── Alert ───────────────────────────────────────────────────
        let notes = self.alert(unit, &detections, &mut log).await;

        // ── Record ──────────────────────────────────────────────────
        if let Some(storage) = &storage {
            self.record(unit, &detections, &notes, storage.as_ref(), &mut log).await;
        }

        // ── Aggregate ───────────────────────────────────────────────
        let reasons: Vec<&str> = notes
            .iter()
            .filter(|n| n.sent)
            .filter_map(|n| n.reason.as_deref())
            .collect();
        let alert_sent = notes.iter().any(|n| n.sent);
        let alert_reason = (!reasons.is_empty()).then(|| reasons.join("; "));

        let anomalies = detections.iter().filter(|d| d.is_anomaly).count();
        info!(
            detectors = detections.len(),
            anomalies,
            alert_sent,
            errors = log.entries.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "check finished"
        );

        CheckResult {
            metric_name: unit.name().to_string(),
            execution_time,
            datapoint,
            detections,
            alert_sent,
            alert_reason,
            errors: log.entries,
        }
    }

    /// Build the collector, read one point and close it on every path.
    ///
    /// A close failure is recorded but does not discard a collected point.
    async fn collect(
        &self,
        unit: &MetricUnit,
        execution_time: DateTime<Utc>,
        log: &mut ErrorLog,
    ) -> StageResult<DataPoint> {
        let spec = unit.collector();
        let collector = self
            .registry
            .create_collector(&spec.kind, &spec.params)
            .map_err(|e| StageFailure::new(Stage::Collect, format!("Collection failed: {e}")))?;

        let outcome = collector.collect(execution_time).await;
        if let Err(e) = collector.close().await {
            log.record(StageFailure::new(Stage::Collect, format!("Failed to close collector: {e}")));
        }
        outcome.map_err(|e| StageFailure::new(Stage::Collect, format!("Collection failed: {e}")))
    }

    /// Returns the storage handle shared with detectors, when one was created.
    async fn persist(
        &self,
        unit: &MetricUnit,
        point: &DataPoint,
        log: &mut ErrorLog,
    ) -> Option<Arc<dyn Storage>> {
        let kind = unit.storage_kind()?;
        let storage = log.note(
            self.registry
                .create_storage(kind, &unit.storage().params)
                .map_err(|e| StageFailure::new(Stage::Persist, format!("Failed to create storage '{kind}': {e}"))),
        )?;

        log.note(ensure_tables(storage.as_ref()).await);
        log.note(
            storage
                .save_datapoint(unit.name(), point)
                .await
                .map_err(|e| StageFailure::new(Stage::Persist, format!("Failed to save datapoint: {e}"))),
        );
        Some(storage)
    }

    /// Run every detector in configured order.
    ///
    /// A failing detector is replaced by a normal result carrying an `error`
    /// metadata entry, so the output always has one result per detector.
    async fn detect(
        &self,
        unit: &MetricUnit,
        point: &DataPoint,
        storage: Option<&Arc<dyn Storage>>,
        log: &mut ErrorLog,
    ) -> Vec<DetectionResult> {
        let mut results = Vec::with_capacity(unit.detectors().len());
        for detector in unit.detectors() {
            let result = match self.run_detector(unit.name(), detector, point, storage.cloned()).await {
                Ok(result) => result,
                Err(failure) => {
                    let message = failure.message.clone();
                    log.record(failure);
                    DetectionResult::normal(unit.name(), point.timestamp, point.value).with_metadata("error", message)
                }
            };
            debug!(detector_id = %detector.id(), anomaly = result.is_anomaly, score = ?result.score, "detector ran");
            results.push(stamp(result, detector));
        }
        results
    }

    /// Construct one detector with the shared storage handle and run it.
    async fn run_detector(
        &self,
        metric_name: &str,
        config: &DetectorConfig,
        point: &DataPoint,
        storage: Option<Arc<dyn Storage>>,
    ) -> StageResult<DetectionResult> {
        let failed = |e: PluginError| {
            StageFailure::new(
                Stage::Detect,
                format!("Detector '{}' ({}) failed: {e}", config.id(), config.kind()),
            )
        };
        let detector = self
            .registry
            .create_detector(config.kind(), storage, config.params())
            .map_err(failed)?;
        detector
            .detect(metric_name, point.value, point.timestamp)
            .await
            .map_err(failed)
    }

    /// One note per detection, in the same order.
    async fn alert(&self, unit: &MetricUnit, detections: &[DetectionResult], log: &mut ErrorLog) -> Vec<AlertNote> {
        let mut notes = vec![AlertNote::default(); detections.len()];
        if !detections.iter().any(|d| d.is_anomaly) {
            return notes;
        }

        let spec = unit.alerter();
        let Some(alerter) = log.note(
            self.registry
                .create_alerter(&spec.kind, &spec.params)
                .map_err(|e| StageFailure::new(Stage::Alert, format!("Failed to create alerter '{}': {e}", spec.kind))),
        ) else {
            return notes;
        };

        for (detection, note) in detections.iter().zip(notes.iter_mut()) {
            if !detection.is_anomaly {
                continue;
            }
            let id = detection.detector_id().unwrap_or("unknown");
            let started = Instant::now();
            match send(alerter.as_ref(), detection, id).await {
                Ok(AlertOutcome::Sent) => {
                    info!(
                        detector_id = %id,
                        channel = alerter.channel_name(),
                        duration_ms = started.elapsed().as_millis() as u64,
                        "alert delivered"
                    );
                    note.sent = true;
                    note.reason = Some(alert_reason(id, detection.score));
                }
                Ok(AlertOutcome::Skipped { reason }) => {
                    log.record(StageFailure::new(
                        Stage::Alert,
                        format!("Alert skipped for detector '{id}': {reason}"),
                    ));
                    note.reason = Some(reason);
                }
                Err(failure) => log.record(failure),
            }
        }
        notes
    }

    /// Persist one record per detection, then close the storage.
    ///
    /// This is the only place the invocation's storage is released.
    async fn record(
        &self,
        unit: &MetricUnit,
        detections: &[DetectionResult],
        notes: &[AlertNote],
        storage: &dyn Storage,
        log: &mut ErrorLog,
    ) {
        let alerter_type = unit.alerter().kind.clone();
        for (detection, note) in detections.iter().zip(notes) {
            let detector_id = detection.detector_id().unwrap_or_default().to_string();
            let record = DetectionRecord {
                detector_id: detector_id.clone(),
                result: detection.clone(),
                alert_sent: note.sent,
                alert_reason: note.reason.clone(),
                alerter_type: note.sent.then(|| alerter_type.clone()),
            };
            log.note(storage.save_detection(unit.name(), &record).await.map_err(|e| {
                StageFailure::new(Stage::Record, format!("Failed to save detection '{detector_id}': {e}"))
            }));
        }
        log.note(
            storage
                .close()
                .await
                .map_err(|e| StageFailure::new(Stage::Record, format!("Failed to close storage: {e}"))),
        );
    }

    /// Construct every plugin a unit names, then release it.
    ///
    /// Returns one message per plugin that could not be built.
    pub async fn validate_plugins(&self, unit: &MetricUnit) -> Vec<String> {
        let mut problems = Vec::new();

        let spec = unit.collector();
        match self.registry.create_collector(&spec.kind, &spec.params) {
            Ok(collector) => {
                if let Err(e) = collector.close().await {
                    problems.push(format!("collector: failed to close: {e}"));
                }
            }
            Err(e) => problems.push(format!("collector: {e}")),
        }

        let mut storage = None;
        if let Some(kind) = unit.storage_kind() {
            match self.registry.create_storage(kind, &unit.storage().params) {
                Ok(s) => storage = Some(s),
                Err(e) => problems.push(format!("storage: {e}")),
            }
        }

        for (i, detector) in unit.detectors().iter().enumerate() {
            if let Err(e) = self
                .registry
                .create_detector(detector.kind(), storage.clone(), detector.params())
            {
                problems.push(format!("detectors[{i}] ({}): {e}", detector.id()));
            }
        }

        let spec = unit.alerter();
        if let Err(e) = self.registry.create_alerter(&spec.kind, &spec.params) {
            problems.push(format!("alerter: {e}"));
        }

        if let Some(storage) = storage {
            if let Err(e) = storage.close().await {
                problems.push(format!("storage: failed to close: {e}"));
            }
        }
        problems
    }

    /// Apply the unit's retention policy through its storage.
    pub async fn cleanup(&self, unit: &MetricUnit, now: DateTime<Utc>) -> Result<CleanupCounts, PluginError> {
        let kind = unit
            .storage_kind()
            .ok_or_else(|| PluginError::Unsupported(format!("storage is disabled for metric '{}'", unit.name())))?;
        let storage = self.registry.create_storage(kind, &unit.storage().params)?;
        let outcome = storage.cleanup_old_data(&unit.retention(), now).await;
        let closed = storage.close().await;
        let counts = outcome?;
        closed?;
        info!(
            metric = %unit.name(),
            datapoints = counts.datapoints_deleted,
            detections = counts.detections_deleted,
            "cleanup finished"
        );
        Ok(counts)
    }
}

/// Create any of [`REQUIRED_TABLES`] that a schema-aware storage lacks.
///
/// Storages without introspection are left alone.
async fn ensure_tables(storage: &dyn Storage) -> StageResult<()> {
    let Some(schema) = storage.introspection() else {
        return Ok(());
    };
    for table in REQUIRED_TABLES {
        let prepared = match schema.table_exists(table).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!(table, "creating missing table");
                schema.create_table(table).await
            }
            Err(e) => Err(e),
        };
        prepared.map_err(|e| StageFailure::new(Stage::Persist, format!("Failed to prepare table '{table}': {e}")))?;
    }
    Ok(())
}

/// Send one alert, attributing a failure to the detector that raised it.
async fn send(alerter: &dyn Alerter, detection: &DetectionResult, id: &str) -> StageResult<AlertOutcome> {
    alerter
        .send(detection)
        .await
        .map_err(|e| StageFailure::new(Stage::Alert, format!("Alert failed for detector '{id}': {e}")))
}

/// Attach the detector's identity to a result.
fn stamp(result: DetectionResult, config: &DetectorConfig) -> DetectionResult {
    result
        .with_metadata("detector_id", config.id())
        .with_metadata("detector_type", config.kind())
        .with_metadata("detector_params", Value::Object(config.params().clone()))
}

/// `[<id>] Anomaly detected: score=<s>`, score to two decimals.
pub fn alert_reason(detector_id: &str, score: Option<f64>) -> String {
    match score {
        Some(s) if s.is_infinite() => format!("[{detector_id}] Anomaly detected: score=inf"),
        Some(s) => format!("[{detector_id}] Anomaly detected: score={s:.2}"),
        None => format!("[{detector_id}] Anomaly detected"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_reason_formats_score() {
        assert_eq!(alert_reason("abc", Some(3.14159)), "[abc] Anomaly detected: score=3.14");
        assert_eq!(alert_reason("abc", Some(f64::INFINITY)), "[abc] Anomaly detected: score=inf");
        assert_eq!(alert_reason("abc", None), "[abc] Anomaly detected");
    }
}
