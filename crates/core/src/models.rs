//! Data model shared by every pipeline stage.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PluginError;

/// Opaque plugin parameters as written in the metric configuration.
pub type Params = serde_json::Map<String, Value>;

/// Deserialize a plugin's typed params from the opaque map.
///
/// Errors name the plugin type so configuration mistakes are traceable.
pub fn parse_params<T: DeserializeOwned>(kind: &str, params: &Params) -> Result<T, PluginError> {
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| PluginError::invalid_params(kind, e))
}

// ── Data points ─────────────────────────────────────────────────────

/// One observation of a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    /// `None` when no value could be observed.
    pub value: Option<f64>,
    #[serde(default)]
    pub is_missing: bool,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: Params,
}

impl DataPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value: Some(value),
            is_missing: false,
            metadata: Params::new(),
        }
    }

    /// Build a point from an optional value; `None` yields a missing point.
    pub fn from_option(timestamp: DateTime<Utc>, value: Option<f64>) -> Self {
        match value {
            Some(v) => Self::new(timestamp, v),
            None => Self::missing(timestamp),
        }
    }

    /// Sentinel used when nothing could be observed at `timestamp`.
    pub fn missing(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            value: None,
            is_missing: true,
            metadata: Params::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ── Detection ───────────────────────────────────────────────────────

/// Direction of an anomalous deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

/// Outcome of one detector run against one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub metric_name: String,
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
    pub is_anomaly: bool,
    /// May be infinite when the baseline is zero.
    #[serde(default, with = "non_finite")]
    pub score: Option<f64>,
    #[serde(default, with = "non_finite")]
    pub lower_bound: Option<f64>,
    #[serde(default, with = "non_finite")]
    pub upper_bound: Option<f64>,
    pub direction: Option<Direction>,
    #[serde(default, with = "non_finite")]
    pub percent_deviation: Option<f64>,
    #[serde(default)]
    pub metadata: Params,
}

impl DetectionResult {
    /// A non-anomalous result with no bounds.
    pub fn normal(metric_name: impl Into<String>, timestamp: DateTime<Utc>, value: Option<f64>) -> Self {
        Self {
            metric_name: metric_name.into(),
            timestamp,
            value,
            is_anomaly: false,
            score: None,
            lower_bound: None,
            upper_bound: None,
            direction: None,
            percent_deviation: None,
            metadata: Params::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The `detector_id` stamped by the orchestrator, if any.
    pub fn detector_id(&self) -> Option<&str> {
        self.metadata.get("detector_id").and_then(Value::as_str)
    }
}

/// A detection as persisted by a storage plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub detector_id: String,
    pub result: DetectionResult,
    pub alert_sent: bool,
    pub alert_reason: Option<String>,
    pub alerter_type: Option<String>,
}

impl DetectionRecord {
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.result.timestamp
    }
}

// ── Pipeline result ─────────────────────────────────────────────────

/// Result of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub metric_name: String,
    pub execution_time: DateTime<Utc>,
    pub datapoint: DataPoint,
    /// One entry per configured detector, in configured order.
    /// Empty when collection failed.
    pub detections: Vec<DetectionResult>,
    pub alert_sent: bool,
    pub alert_reason: Option<String>,
    pub errors: Vec<String>,
}

impl CheckResult {
    pub fn has_anomaly(&self) -> bool {
        self.detections.iter().any(|d| d.is_anomaly)
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &DetectionResult> {
        self.detections.iter().filter(|d| d.is_anomaly)
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Serde helper for optional floats that may be infinite or NaN.
///
/// JSON has no representation for non-finite numbers, so they are written as
/// the strings `"inf"`, `"-inf"` and `"nan"` and parsed back. Finite values
/// stay plain numbers.
pub mod non_finite {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            None => serializer.serialize_none(),
            Some(v) if v.is_finite() => serializer.serialize_some(v),
            Some(v) if v.is_nan() => serializer.serialize_some("nan"),
            Some(v) if *v > 0.0 => serializer.serialize_some("inf"),
            Some(_) => serializer.serialize_some("-inf"),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        match Option::<Repr>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Repr::Number(v)) => Ok(Some(v)),
            Some(Repr::Text(text)) => match text.as_str() {
                "inf" => Ok(Some(f64::INFINITY)),
                "-inf" => Ok(Some(f64::NEG_INFINITY)),
                "nan" => Ok(Some(f64::NAN)),
                other => Err(D::Error::custom(format!("expected a number, 'inf', '-inf' or 'nan', got '{other}'"))),
            },
        }
    }
}

// ── Retention ───────────────────────────────────────────────────────

/// How long a storage keeps datapoints and detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub datapoints_days: u32,
    pub detections_days: u32,
}

impl RetentionPolicy {
    pub fn uniform(days: u32) -> Self {
        Self {
            datapoints_days: days,
            detections_days: days,
        }
    }
}

/// Rows removed by a retention cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupCounts {
    pub datapoints_deleted: usize,
    pub detections_deleted: usize,
}
