//! File-backed storage: one JSON object per line.
//!
//! A storage root holds two tables, `datapoints.jsonl` and
//! `detections.jsonl`, shared by all metrics. Rows carry their metric name.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use pulse_core::identity::is_valid_identifier;
use pulse_core::{
    parse_params, CleanupCounts, DataPoint, DetectionRecord, Params, PluginError, RetentionPolicy,
    Storage, StorageIntrospection, Window,
};

use super::memory::retention_cutoff;

const KIND: &str = "jsonl";
pub const DATAPOINTS_TABLE: &str = "datapoints";
pub const DETECTIONS_TABLE: &str = "detections";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonlParams {
    #[serde(default)]
    path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DatapointRow {
    metric_name: String,
    #[serde(flatten)]
    point: DataPoint,
}

#[derive(Debug, Serialize, Deserialize)]
struct DetectionRow {
    metric_name: String,
    #[serde(flatten)]
    record: DetectionRecord,
}

/// Append-only JSON lines files under one root directory.
pub struct JsonlStorage {
    root: PathBuf,
    /// Serializes writes issued through this instance.
    write_lock: Mutex<()>,
}

impl JsonlStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `params.path` wins over the registry-wide default root.
    pub fn from_params(default_root: &Path, params: &Params) -> Result<Self, PluginError> {
        let parsed: JsonlParams = parse_params(KIND, params)?;
        Ok(Self::new(parsed.path.unwrap_or_else(|| default_root.to_path_buf())))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_path(&self, table: &str) -> Result<PathBuf, PluginError> {
        if !is_valid_identifier(table) {
            return Err(PluginError::Storage(format!("invalid table name '{table}'")));
        }
        Ok(self.root.join(format!("{table}.jsonl")))
    }

    async fn append<T: Serialize>(&self, table: &str, row: &T) -> Result<(), PluginError> {
        let mut line = serde_json::to_string(row)
            .map_err(|e| PluginError::Storage(format!("failed to encode row: {e}")))?;
        line.push('\n');

        let path = self.table_path(table)?;
        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(&self.root).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read every row of a table. A missing table reads as empty.
    async fn read_rows<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>, PluginError> {
        let path = self.table_path(table)?;
        let contents = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut rows = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(row) => rows.push(row),
                Err(e) => warn!(path = %path.display(), line = lineno + 1, error = %e, "skipping unreadable row"),
            }
        }
        Ok(rows)
    }

    /// Atomically replace a table's contents.
    ///
    /// Writes to a `.tmp` file first, then renames to the final path.
    async fn rewrite<T: Serialize>(&self, table: &str, rows: &[T]) -> Result<(), PluginError> {
        let path = self.table_path(table)?;
        let tmp_path = self.root.join(format!(".{table}.jsonl.tmp"));

        let mut contents = String::new();
        for row in rows {
            let line = serde_json::to_string(row)
                .map_err(|e| PluginError::Storage(format!("failed to encode row: {e}")))?;
            contents.push_str(&line);
            contents.push('\n');
        }

        fs::write(&tmp_path, contents).await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Storage for JsonlStorage {
    async fn save_datapoint(&self, metric_name: &str, point: &DataPoint) -> Result<(), PluginError> {
        let row = DatapointRow {
            metric_name: metric_name.to_string(),
            point: point.clone(),
        };
        self.append(DATAPOINTS_TABLE, &row).await
    }

    async fn query_datapoints(
        &self,
        metric_name: &str,
        window: &Window,
        end: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>, PluginError> {
        let points: Vec<DataPoint> = self
            .read_rows::<DatapointRow>(DATAPOINTS_TABLE)
            .await?
            .into_iter()
            .filter(|row| row.metric_name == metric_name)
            .map(|row| row.point)
            .collect();
        Ok(window.resolve(end).select(&points, |p| p.timestamp))
    }

    async fn save_detection(&self, metric_name: &str, record: &DetectionRecord) -> Result<(), PluginError> {
        let row = DetectionRow {
            metric_name: metric_name.to_string(),
            record: record.clone(),
        };
        self.append(DETECTIONS_TABLE, &row).await
    }

    async fn query_detections(
        &self,
        metric_name: &str,
        window: &Window,
        end: DateTime<Utc>,
    ) -> Result<Vec<DetectionRecord>, PluginError> {
        let records: Vec<DetectionRecord> = self
            .read_rows::<DetectionRow>(DETECTIONS_TABLE)
            .await?
            .into_iter()
            .filter(|row| row.metric_name == metric_name)
            .map(|row| row.record)
            .collect();
        Ok(window.resolve(end).select(&records, DetectionRecord::timestamp))
    }

    async fn cleanup_old_data(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<CleanupCounts, PluginError> {
        let _guard = self.write_lock.lock().await;
        let mut counts = CleanupCounts::default();

        let dp_cutoff = retention_cutoff(now, policy.datapoints_days);
        let points: Vec<DatapointRow> = self.read_rows(DATAPOINTS_TABLE).await?;
        let before = points.len();
        let kept: Vec<DatapointRow> = points
            .into_iter()
            .filter(|row| row.point.timestamp >= dp_cutoff)
            .collect();
        counts.datapoints_deleted = before - kept.len();
        if counts.datapoints_deleted > 0 {
            self.rewrite(DATAPOINTS_TABLE, &kept).await?;
        }

        let det_cutoff = retention_cutoff(now, policy.detections_days);
        let records: Vec<DetectionRow> = self.read_rows(DETECTIONS_TABLE).await?;
        let before = records.len();
        let kept: Vec<DetectionRow> = records
            .into_iter()
            .filter(|row| row.record.timestamp() >= det_cutoff)
            .collect();
        counts.detections_deleted = before - kept.len();
        if counts.detections_deleted > 0 {
            self.rewrite(DETECTIONS_TABLE, &kept).await?;
        }

        info!(
            root = %self.root.display(),
            datapoints = counts.datapoints_deleted,
            detections = counts.detections_deleted,
            "retention cleanup finished"
        );
        Ok(counts)
    }

    async fn close(&self) -> Result<(), PluginError> {
        Ok(())
    }

    fn introspection(&self) -> Option<&dyn StorageIntrospection> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl StorageIntrospection for JsonlStorage {
    async fn table_exists(&self, table: &str) -> Result<bool, PluginError> {
        let path = self.table_path(table)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn create_table(&self, table: &str) -> Result<(), PluginError> {
        let path = self.table_path(table)?;
        fs::create_dir_all(&self.root).await?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        debug!(path = %path.display(), "created table");
        Ok(())
    }
}
