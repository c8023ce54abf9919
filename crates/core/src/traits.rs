//! Plugin contracts for the four pipeline roles.
//!
//! Every required operation must be implemented; optional capabilities
//! (`as_bulk`, `introspection`) default to absent and are queried at the
//! call site.

use chrono::{DateTime, Utc};

use crate::error::PluginError;
use crate::models::{CleanupCounts, DataPoint, DetectionRecord, DetectionResult, RetentionPolicy};
use crate::window::Window;

/// Pulls one value of a metric from an external source.
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    /// Observe the metric as of `at_time`.
    async fn collect(&self, at_time: DateTime<Utc>) -> Result<DataPoint, PluginError>;

    /// Release resources held by this instance.
    async fn close(&self) -> Result<(), PluginError>;

    /// Bulk loading capability, used to preload history before a backtest.
    fn as_bulk(&self) -> Option<&dyn BulkCollector> {
        None
    }
}

/// Loads a contiguous range of history in one call.
#[async_trait::async_trait]
pub trait BulkCollector: Send + Sync {
    /// Collect every point with `start <= timestamp < finish`, ascending.
    async fn collect_bulk(
        &self,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>, PluginError>;
}

/// Persists datapoints and detections and answers windowed history queries.
///
/// Queries resolve the window against `end` (see [`Window::resolve`]) and
/// return rows ascending by timestamp.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    async fn save_datapoint(&self, metric_name: &str, point: &DataPoint) -> Result<(), PluginError>;

    async fn query_datapoints(
        &self,
        metric_name: &str,
        window: &Window,
        end: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>, PluginError>;

    async fn save_detection(
        &self,
        metric_name: &str,
        record: &DetectionRecord,
    ) -> Result<(), PluginError>;

    async fn query_detections(
        &self,
        metric_name: &str,
        window: &Window,
        end: DateTime<Utc>,
    ) -> Result<Vec<DetectionRecord>, PluginError>;

    /// Delete rows older than the policy allows, relative to `now`.
    async fn cleanup_old_data(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<CleanupCounts, PluginError>;

    async fn close(&self) -> Result<(), PluginError>;

    /// Table management capability for backends with a schema.
    fn introspection(&self) -> Option<&dyn StorageIntrospection> {
        None
    }
}

/// Schema management for storages that keep named tables.
#[async_trait::async_trait]
pub trait StorageIntrospection: Send + Sync {
    async fn table_exists(&self, table: &str) -> Result<bool, PluginError>;
    async fn create_table(&self, table: &str) -> Result<(), PluginError>;
}

/// Decides whether one value is anomalous.
#[async_trait::async_trait]
pub trait Detector: Send + Sync {
    async fn detect(
        &self,
        metric_name: &str,
        value: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<DetectionResult, PluginError>;
}

/// Outcome of an alert attempt that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    Sent,
    /// The alerter chose not to deliver (e.g. cooldown).
    Skipped { reason: String },
}

impl AlertOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, AlertOutcome::Sent)
    }
}

/// Delivers a notification for an anomalous detection.
#[async_trait::async_trait]
pub trait Alerter: Send + Sync {
    async fn send(&self, result: &DetectionResult) -> Result<AlertOutcome, PluginError>;

    /// Human-readable channel name (e.g. "webhook", "log").
    fn channel_name(&self) -> &str;
}
