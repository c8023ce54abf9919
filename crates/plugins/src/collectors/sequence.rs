//! Replays a fixed series of samples laid out on a regular grid.
//!
//! Sample `i` is in effect during `[start + i * interval, start + (i + 1) * interval)`.
//! Useful for demos and backtests of detector configurations.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use pulse_config::timestamp::parse_timestamp;
use pulse_core::window::parse_duration;
use pulse_core::{parse_params, BulkCollector, Collector, DataPoint, Params, PluginError};

const KIND: &str = "sequence";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SequenceParams {
    start: String,
    interval: String,
    values: Vec<Option<f64>>,
    /// Cycle through `values` instead of going missing after the last one.
    #[serde(default)]
    repeat: bool,
}

/// Replays a fixed series of samples spaced `interval` apart from `start`.
///
/// Useful for backtests and demos. Also implements [`BulkCollector`] so
/// history can be preloaded in one call.
pub struct SequenceCollector {
    start: DateTime<Utc>,
    interval: Duration,
    values: Vec<Option<f64>>,
    repeat: bool,
}

impl SequenceCollector {
    pub fn from_params(params: &Params) -> Result<Self, PluginError> {
        let parsed: SequenceParams = parse_params(KIND, params)?;
        let start = parse_timestamp(&parsed.start).ok_or_else(|| {
            PluginError::invalid_params(KIND, format!("invalid start timestamp '{}'", parsed.start))
        })?;
        let interval = parse_duration(&parsed.interval).map_err(|e| PluginError::invalid_params(KIND, e))?;
        if interval <= Duration::zero() {
            return Err(PluginError::invalid_params(KIND, "interval must be positive"));
        }
        if parsed.values.is_empty() {
            return Err(PluginError::invalid_params(KIND, "values must not be empty"));
        }
        Ok(Self {
            start,
            interval,
            values: parsed.values,
            repeat: parsed.repeat,
        })
    }

    /// Index of the sample in effect at `at`, if any.
    fn slot(&self, at: DateTime<Utc>) -> Option<usize> {
        if at < self.start {
            return None;
        }
        let elapsed = (at - self.start).num_milliseconds();
        let slot = usize::try_from(elapsed / self.interval.num_milliseconds()).ok()?;
        if self.repeat {
            Some(slot % self.values.len())
        } else if slot < self.values.len() {
            Some(slot)
        } else {
            None
        }
    }

    fn sample_time(&self, n: i32) -> Option<DateTime<Utc>> {
        self.interval
            .checked_mul(n)
            .and_then(|offset| self.start.checked_add_signed(offset))
    }
}

#[async_trait::async_trait]
impl Collector for SequenceCollector {
    async fn collect(&self, at_time: DateTime<Utc>) -> Result<DataPoint, PluginError> {
        let value = self.slot(at_time).and_then(|i| self.values[i]);
        Ok(DataPoint::from_option(at_time, value))
    }

    async fn close(&self) -> Result<(), PluginError> {
        Ok(())
    }

    fn as_bulk(&self) -> Option<&dyn BulkCollector> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl BulkCollector for SequenceCollector {
    async fn collect_bulk(
        &self,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>, PluginError> {
        let mut points = Vec::new();
        let mut n: i32 = 0;
        while let Some(ts) = self.sample_time(n) {
            if ts >= finish || (!self.repeat && n as usize >= self.values.len()) {
                break;
            }
            if ts >= start {
                let value = self.values[n as usize % self.values.len()];
                points.push(DataPoint::from_option(ts, value));
            }
            n = n
                .checked_add(1)
                .ok_or_else(|| PluginError::Collection("sequence range too large".to_string()))?;
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn collector(repeat: bool) -> SequenceCollector {
        let params = json!({
            "start": "2024-01-01 00:00:00",
            "interval": "10 minutes",
            "values": [1.0, 2.0, null],
            "repeat": repeat,
        });
        SequenceCollector::from_params(params.as_object().unwrap()).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn collect_returns_sample_in_effect() {
        let c = collector(false);
        assert_eq!(c.collect(at(0, 5)).await.unwrap().value, Some(1.0));
        assert_eq!(c.collect(at(0, 10)).await.unwrap().value, Some(2.0));
        assert!(c.collect(at(0, 25)).await.unwrap().is_missing);
        assert!(c.collect(at(1, 0)).await.unwrap().is_missing);
    }

    #[tokio::test]
    async fn repeat_cycles_values() {
        let c = collector(true);
        assert_eq!(c.collect(at(0, 30)).await.unwrap().value, Some(1.0));
        assert_eq!(c.collect(at(0, 45)).await.unwrap().value, Some(2.0));
    }

    #[tokio::test]
    async fn bulk_is_half_open() {
        let c = collector(true);
        let bulk = c.as_bulk().unwrap();
        let points = bulk.collect_bulk(at(0, 10), at(0, 40)).await.unwrap();
        let times: Vec<_> = points.iter().map(|p| p.timestamp).collect();
        assert_eq!(times, vec![at(0, 10), at(0, 20), at(0, 30)]);
        assert!(points[1].is_missing);
    }

    #[test]
    fn rejects_unknown_params() {
        let params = json!({ "start": "2024-01-01", "interval": "1 hour", "values": [1], "step": 2 });
        assert!(SequenceCollector::from_params(params.as_object().unwrap()).is_err());
    }
}
