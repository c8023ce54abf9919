//! Process-local storage shared by every instance created from one registry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use pulse_core::{
    CleanupCounts, DataPoint, DetectionRecord, PluginError, RetentionPolicy, Storage, Window,
};

#[derive(Debug, Default)]
struct MetricHistory {
    datapoints: Vec<DataPoint>,
    detections: Vec<DetectionRecord>,
}

/// The backing store. Held by the registry; instances are handles to it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    metrics: RwLock<HashMap<String, MetricHistory>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of datapoints stored for `metric_name`.
    pub async fn datapoint_count(&self, metric_name: &str) -> usize {
        self.metrics
            .read()
            .await
            .get(metric_name)
            .map_or(0, |h| h.datapoints.len())
    }
}

/// Handle to a shared [`MemoryStore`].
pub struct MemoryStorage {
    store: Arc<MemoryStore>,
}

impl MemoryStorage {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

/// Cutoff for `days` of retention; rows strictly older are dropped.
pub(crate) fn retention_cutoff(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now.checked_sub_signed(Duration::days(i64::from(days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn save_datapoint(&self, metric_name: &str, point: &DataPoint) -> Result<(), PluginError> {
        let mut metrics = self.store.metrics.write().await;
        metrics
            .entry(metric_name.to_string())
            .or_default()
            .datapoints
            .push(point.clone());
        Ok(())
    }

    async fn query_datapoints(
        &self,
        metric_name: &str,
        window: &Window,
        end: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>, PluginError> {
        let metrics = self.store.metrics.read().await;
        Ok(metrics
            .get(metric_name)
            .map(|h| window.resolve(end).select(&h.datapoints, |p| p.timestamp))
            .unwrap_or_default())
    }

    async fn save_detection(&self, metric_name: &str, record: &DetectionRecord) -> Result<(), PluginError> {
        let mut metrics = self.store.metrics.write().await;
        metrics
            .entry(metric_name.to_string())
            .or_default()
            .detections
            .push(record.clone());
        Ok(())
    }

    async fn query_detections(
        &self,
        metric_name: &str,
        window: &Window,
        end: DateTime<Utc>,
    ) -> Result<Vec<DetectionRecord>, PluginError> {
        let metrics = self.store.metrics.read().await;
        Ok(metrics
            .get(metric_name)
            .map(|h| window.resolve(end).select(&h.detections, DetectionRecord::timestamp))
            .unwrap_or_default())
    }

    async fn cleanup_old_data(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<CleanupCounts, PluginError> {
        let dp_cutoff = retention_cutoff(now, policy.datapoints_days);
        let det_cutoff = retention_cutoff(now, policy.detections_days);
        let mut counts = CleanupCounts::default();

        let mut metrics = self.store.metrics.write().await;
        for history in metrics.values_mut() {
            let before = history.datapoints.len();
            history.datapoints.retain(|p| p.timestamp >= dp_cutoff);
            counts.datapoints_deleted += before - history.datapoints.len();

            let before = history.detections.len();
            history.detections.retain(|d| d.timestamp() >= det_cutoff);
            counts.detections_deleted += before - history.detections.len();
        }
        Ok(counts)
    }

    async fn close(&self) -> Result<(), PluginError> {
        Ok(())
    }
}
