use chrono::{DateTime, Utc};
use serde::Deserialize;

use pulse_core::{parse_params, Detector, DetectionResult, Params, PluginError};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MissingDataParams {}

/// Flags executions where the collector produced no value.
pub struct MissingDataDetector;

impl MissingDataDetector {
    /// Takes no params; any key is rejected.
    pub fn from_params(params: &Params) -> Result<Self, PluginError> {
        let _: MissingDataParams = parse_params("missing_data", params)?;
        Ok(Self)
    }
}

#[async_trait::async_trait]
impl Detector for MissingDataDetector {
    async fn detect(
        &self,
        metric_name: &str,
        value: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<DetectionResult, PluginError> {
        let mut result = DetectionResult::normal(metric_name, timestamp, value);
        if value.is_none() {
            result.is_anomaly = true;
            result.score = Some(1.0);
        } else {
            result.score = Some(0.0);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn flags_missing_values_only() {
        let d = MissingDataDetector::from_params(&Params::new()).unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(d.detect("m", None, ts).await.unwrap().is_anomaly);
        assert!(!d.detect("m", Some(0.0), ts).await.unwrap().is_anomaly);
    }
}
