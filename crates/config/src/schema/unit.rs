//! The validated, immutable metric unit.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use pulse_core::{Params, RetentionPolicy};

use super::{BacktestSpec, PluginSpec, ScheduleSpec, StorageSpec};
use crate::error::{ConfigError, Result};

/// A detector with its id resolved (manual or derived).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorConfig {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    params: Params,
}

impl DetectorConfig {
    pub(crate) fn new(id: String, kind: String, params: Params) -> Self {
        Self { id, kind, params }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

/// Parsed backtest window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacktestPlan {
    pub data_load_start: DateTime<Utc>,
    pub detection_start: DateTime<Utc>,
    pub detection_end: DateTime<Utc>,
    pub step_interval: Duration,
}

impl BacktestPlan {
    /// `floor((detection_end - detection_start) / step_interval)`, for progress display.
    pub fn total_steps(&self) -> u64 {
        let span = (self.detection_end - self.detection_start).num_milliseconds();
        let step = self.step_interval.num_milliseconds();
        if step <= 0 || span < 0 {
            return 0;
        }
        (span / step) as u64
    }
}

/// A validated metric configuration.
///
/// Built only by validation; fields are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricUnit {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) collector: PluginSpec,
    pub(crate) detectors: Vec<DetectorConfig>,
    pub(crate) alerter: PluginSpec,
    pub(crate) storage: StorageSpec,
    pub(crate) backtest: BacktestSpec,
    #[serde(skip)]
    pub(crate) backtest_plan: Option<BacktestPlan>,
    pub(crate) schedule: Option<ScheduleSpec>,
    pub(crate) metadata: Params,
}

impl MetricUnit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn collector(&self) -> &PluginSpec {
        &self.collector
    }

    /// Configured detectors in order. Never empty, whichever form the
    /// document used.
    pub fn detectors(&self) -> &[DetectorConfig] {
        &self.detectors
    }

    pub fn alerter(&self) -> &PluginSpec {
        &self.alerter
    }

    pub fn storage(&self) -> &StorageSpec {
        &self.storage
    }

    /// Storage plugin type, or `None` when storage is disabled.
    ///
    /// Falls back to the collector's type when not set explicitly.
    pub fn storage_kind(&self) -> Option<&str> {
        if !self.storage.enabled {
            return None;
        }
        Some(self.storage.kind.as_deref().unwrap_or(&self.collector.kind))
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::uniform(u32::try_from(self.storage.retention_days).unwrap_or(u32::MAX))
    }

    pub fn backtest(&self) -> &BacktestSpec {
        &self.backtest
    }

    /// The parsed backtest window; errors when backtesting is disabled.
    pub fn backtest_plan(&self) -> Result<&BacktestPlan> {
        self.backtest_plan
            .as_ref()
            .ok_or_else(|| ConfigError::BacktestDisabled(self.name.clone()))
    }

    pub fn schedule(&self) -> Option<&ScheduleSpec> {
        self.schedule.as_ref()
    }

    pub fn metadata(&self) -> &Params {
        &self.metadata
    }
}
