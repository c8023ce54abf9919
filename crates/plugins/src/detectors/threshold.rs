//! Static bounds check.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use pulse_core::{parse_params, Detector, DetectionResult, Direction, Params, PluginError};

const KIND: &str = "threshold";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Operator {
    /// Anomalous above `upper` or below `lower`.
    Outside,
    /// Anomalous only above `upper`.
    Above,
    /// Anomalous only below `lower`.
    Below,
}

fn default_operator() -> Operator {
    Operator::Outside
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ThresholdParams {
    #[serde(default)]
    upper: Option<f64>,
    #[serde(default)]
    lower: Option<f64>,
    #[serde(default = "default_operator")]
    operator: Operator,
}

/// Flags values beyond fixed bounds.
///
/// The score is the distance past the crossed bound, so larger breaches rank
/// higher. Missing values are never anomalous here; pair with
/// `missing_data` to catch gaps.
#[derive(Debug)]
pub struct ThresholdDetector {
    upper: Option<f64>,
    lower: Option<f64>,
    operator: Operator,
}

impl ThresholdDetector {
    /// Build from `upper` / `lower` / `operator`.
    ///
    /// Rejects an operator without its bound and `lower > upper`.
    pub fn from_params(params: &Params) -> Result<Self, PluginError> {
        let parsed: ThresholdParams = parse_params(KIND, params)?;
        let ok = match parsed.operator {
            Operator::Outside => parsed.upper.is_some() || parsed.lower.is_some(),
            Operator::Above => parsed.upper.is_some(),
            Operator::Below => parsed.lower.is_some(),
        };
        if !ok {
            return Err(PluginError::invalid_params(
                KIND,
                "operator needs a matching bound ('above' needs upper, 'below' needs lower)",
            ));
        }
        if let (Some(lo), Some(hi)) = (parsed.lower, parsed.upper) {
            if lo > hi {
                return Err(PluginError::invalid_params(KIND, format!("lower ({lo}) exceeds upper ({hi})")));
            }
        }
        Ok(Self {
            upper: parsed.upper,
            lower: parsed.lower,
            operator: parsed.operator,
        })
    }

    fn checks_upper(&self) -> Option<f64> {
        match self.operator {
            Operator::Outside | Operator::Above => self.upper,
            Operator::Below => None,
        }
    }

    fn checks_lower(&self) -> Option<f64> {
        match self.operator {
            Operator::Outside | Operator::Below => self.lower,
            Operator::Above => None,
        }
    }
}

/// Deviation from `bound` in percent; infinite when the bound is zero.
fn percent_of(value: f64, bound: f64) -> f64 {
    if bound == 0.0 {
        f64::INFINITY
    } else {
        (value - bound) / bound.abs() * 100.0
    }
}

#[async_trait::async_trait]
impl Detector for ThresholdDetector {
    async fn detect(
        &self,
        metric_name: &str,
        value: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<DetectionResult, PluginError> {
        let mut result = DetectionResult::normal(metric_name, timestamp, value);
        result.lower_bound = self.checks_lower();
        result.upper_bound = self.checks_upper();

        let Some(v) = value else {
            return Ok(result);
        };

        let breach = match (self.checks_upper(), self.checks_lower()) {
            (Some(hi), _) if v > hi => Some((hi, Direction::Up)),
            (_, Some(lo)) if v < lo => Some((lo, Direction::Down)),
            _ => None,
        };

        match breach {
            Some((bound, direction)) => {
                result.is_anomaly = true;
                result.score = Some((v - bound).abs());
                result.direction = Some(direction);
                let pct = percent_of(v, bound);
                result.percent_deviation = Some(match direction {
                    Direction::Down if pct.is_infinite() => f64::NEG_INFINITY,
                    _ => pct,
                });
            }
            None => result.score = Some(0.0),
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn detector(v: serde_json::Value) -> Result<ThresholdDetector, PluginError> {
        ThresholdDetector::from_params(v.as_object().unwrap())
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn flags_values_outside_bounds() {
        let d = detector(json!({ "lower": 10.0, "upper": 100.0 })).unwrap();

        let high = d.detect("m", Some(150.0), ts()).await.unwrap();
        assert!(high.is_anomaly);
        assert_eq!(high.direction, Some(Direction::Up));
        assert_eq!(high.score, Some(50.0));
        assert_eq!(high.percent_deviation, Some(50.0));

        let low = d.detect("m", Some(5.0), ts()).await.unwrap();
        assert!(low.is_anomaly);
        assert_eq!(low.direction, Some(Direction::Down));
        assert_eq!(low.percent_deviation, Some(-50.0));

        let ok = d.detect("m", Some(100.0), ts()).await.unwrap();
        assert!(!ok.is_anomaly);
        assert_eq!(ok.upper_bound, Some(100.0));
    }

    #[tokio::test]
    async fn operator_limits_checked_side() {
        let d = detector(json!({ "lower": 10.0, "upper": 100.0, "operator": "above" })).unwrap();
        assert!(!d.detect("m", Some(1.0), ts()).await.unwrap().is_anomaly);
        assert!(d.detect("m", Some(101.0), ts()).await.unwrap().is_anomaly);
    }

    #[tokio::test]
    async fn missing_value_is_not_anomalous() {
        let d = detector(json!({ "upper": 1.0 })).unwrap();
        let r = d.detect("m", None, ts()).await.unwrap();
        assert!(!r.is_anomaly);
        assert_eq!(r.score, None);
    }

    #[tokio::test]
    async fn zero_bound_gives_infinite_deviation() {
        let d = detector(json!({ "upper": 0.0 })).unwrap();
        let r = d.detect("m", Some(3.0), ts()).await.unwrap();
        assert_eq!(r.percent_deviation, Some(f64::INFINITY));
        assert_eq!(r.score, Some(3.0));
    }

    #[test]
    fn rejects_unusable_params() {
        assert!(detector(json!({})).is_err());
        assert!(detector(json!({ "lower": 1.0, "operator": "above" })).is_err());
        assert!(detector(json!({ "lower": 5.0, "upper": 1.0 })).is_err());
        assert!(detector(json!({ "upper": 1.0, "limit": 2 })).is_err());
    }
}
