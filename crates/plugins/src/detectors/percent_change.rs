//! Relative change against the mean of recent history.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use pulse_core::{parse_params, Detector, DetectionResult, Direction, Params, PluginError, Storage, Window};

const KIND: &str = "percent_change";

fn default_window() -> Window {
    Window::Points(1)
}

fn default_max_percent() -> f64 {
    20.0
}

fn default_min_points() -> usize {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PercentChangeParams {
    #[serde(default = "default_window")]
    window: Window,
    #[serde(default = "default_max_percent")]
    max_percent: f64,
    #[serde(default = "default_min_points")]
    min_points: usize,
}

/// Compares a value with the mean of its recent history.
///
/// History comes from the metric's storage through `window` and excludes
/// the point being checked. With fewer than `min_points` historical values
/// the result is normal and marked `insufficient_history`.
pub struct PercentChangeDetector {
    storage: Arc<dyn Storage>,
    window: Window,
    max_percent: f64,
    min_points: usize,
}

impl PercentChangeDetector {
    /// Fails without a storage handle, since there is no history to compare to.
    pub fn from_params(storage: Option<Arc<dyn Storage>>, params: &Params) -> Result<Self, PluginError> {
        let parsed: PercentChangeParams = parse_params(KIND, params)?;
        let storage = storage.ok_or_else(|| {
            PluginError::invalid_params(KIND, "requires storage to read history (enable storage for this metric)")
        })?;
        if !parsed.max_percent.is_finite() || parsed.max_percent <= 0.0 {
            return Err(PluginError::invalid_params(KIND, "max_percent must be a positive number"));
        }
        if parsed.min_points == 0 {
            return Err(PluginError::invalid_params(KIND, "min_points must be at least 1"));
        }
        Ok(Self {
            storage,
            window: parsed.window,
            max_percent: parsed.max_percent,
            min_points: parsed.min_points,
        })
    }

    /// Non-missing values strictly before `timestamp`.
    async fn history(&self, metric_name: &str, timestamp: DateTime<Utc>) -> Result<Vec<f64>, PluginError> {
        // The current point may already be persisted; the window ends just before it.
        let end = timestamp - Duration::nanoseconds(1);
        let points = self.storage.query_datapoints(metric_name, &self.window, end).await?;
        Ok(points
            .into_iter()
            .filter(|p| p.timestamp < timestamp)
            .filter_map(|p| p.value)
            .collect())
    }
}

#[async_trait::async_trait]
impl Detector for PercentChangeDetector {
    async fn detect(
        &self,
        metric_name: &str,
        value: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<DetectionResult, PluginError> {
        let mut result = DetectionResult::normal(metric_name, timestamp, value);
        let Some(v) = value else {
            return Ok(result);
        };

        let history = self.history(metric_name, timestamp).await?;
        result = result.with_metadata("history_points", history.len());
        if history.len() < self.min_points {
            return Ok(result.with_metadata("insufficient_history", true));
        }

        let baseline = history.iter().sum::<f64>() / history.len() as f64;
        let band = (baseline * self.max_percent / 100.0).abs();
        result.lower_bound = Some(baseline - band);
        result.upper_bound = Some(baseline + band);
        result = result.with_metadata("baseline", baseline);

        let deviation = if baseline == 0.0 {
            if v == 0.0 {
                0.0
            } else {
                f64::INFINITY
            }
        } else {
            (v - baseline).abs() / baseline.abs() * 100.0
        };

        result.score = Some(deviation / self.max_percent);
        result.percent_deviation = Some(if v < baseline { -deviation } else { deviation });
        if deviation > self.max_percent {
            result.is_anomaly = true;
            result.direction = Some(if v > baseline { Direction::Up } else { Direction::Down });
        }
        Ok(result)
    }
}
