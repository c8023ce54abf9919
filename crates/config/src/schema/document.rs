//! Metric configuration as written in YAML, before validation.

use serde::{Deserialize, Serialize};

use pulse_core::Params;

/// Top-level metric document parsed from YAML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricDocument {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub collector: PluginSpec,
    /// Single-detector form. Mutually exclusive with `detectors`.
    #[serde(default)]
    pub detector: Option<DetectorSpec>,
    /// Multi-detector form. Mutually exclusive with `detector`.
    #[serde(default)]
    pub detectors: Option<Vec<DetectorSpec>>,
    pub alerter: PluginSpec,
    #[serde(default)]
    pub storage: StorageSpec,
    #[serde(default)]
    pub backtest: BacktestSpec,
    #[serde(default)]
    pub schedule: Option<ScheduleSpec>,
    #[serde(default)]
    pub metadata: Params,
}

/// A collector or alerter: plugin type plus opaque params.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PluginSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Params,
}

/// A detector entry; `id` is optional and resolved during validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DetectorSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Params,
}

/// History storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StorageSpec {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Falls back to the collector's type when absent.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub params: Params,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for StorageSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: None,
            params: Params::new(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> i64 {
    90
}

/// Backtest settings. All four fields are required when `enabled`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BacktestSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub data_load_start: Option<String>,
    #[serde(default)]
    pub detection_start: Option<String>,
    #[serde(default)]
    pub detection_end: Option<String>,
    #[serde(default)]
    pub step_interval: Option<String>,
}

/// Cron schedule for live runs (5 or 6 fields, UTC).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScheduleSpec {
    pub cron: String,
}
