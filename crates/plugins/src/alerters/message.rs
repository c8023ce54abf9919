//! Alert message rendering shared by the built-in alerters.

use serde::Serialize;

use pulse_config::TemplateRenderer;
use pulse_core::{DetectionResult, Direction, Params, PluginError};

/// Values available to a `message_template`.
#[derive(Debug, Serialize)]
struct MessageContext<'a> {
    metric_name: &'a str,
    timestamp: String,
    value: Option<f64>,
    score: Option<f64>,
    lower_bound: Option<f64>,
    upper_bound: Option<f64>,
    direction: Option<Direction>,
    percent_deviation: Option<f64>,
    detector_id: Option<&'a str>,
    metadata: &'a Params,
}

impl<'a> MessageContext<'a> {
    fn new(result: &'a DetectionResult) -> Self {
        Self {
            metric_name: &result.metric_name,
            timestamp: result.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            value: result.value,
            score: result.score,
            lower_bound: result.lower_bound,
            upper_bound: result.upper_bound,
            direction: result.direction,
            percent_deviation: result.percent_deviation,
            detector_id: result.detector_id(),
            metadata: &result.metadata,
        }
    }
}

/// Renders either a user template or the default markdown message.
#[derive(Debug, Default)]
pub struct MessageFormatter {
    template: Option<String>,
    renderer: TemplateRenderer,
}

impl MessageFormatter {
    /// Template syntax is checked here so bad templates fail at plugin creation.
    pub fn new(kind: &str, template: Option<String>) -> Result<Self, PluginError> {
        let renderer = TemplateRenderer::new();
        if let Some(source) = &template {
            renderer
                .validate(source)
                .map_err(|e| PluginError::invalid_params(kind, format!("invalid message_template: {e}")))?;
        }
        Ok(Self { template, renderer })
    }

    pub fn format(&self, result: &DetectionResult) -> Result<String, PluginError> {
        match &self.template {
            Some(source) => self
                .renderer
                .render(source, MessageContext::new(result))
                .map_err(|e| PluginError::Alert(format!("failed to render message: {e}"))),
            None => Ok(default_message(result)),
        }
    }
}

fn format_number(v: f64) -> String {
    if v.is_infinite() {
        if v > 0.0 { "∞" } else { "-∞" }.to_string()
    } else {
        format!("{v:.2}")
    }
}

fn default_message(result: &DetectionResult) -> String {
    let mut lines = vec![
        format!("**ANOMALY DETECTED** `{}`", result.metric_name),
        format!("Time: {}", result.timestamp.format("%Y-%m-%d %H:%M:%S UTC")),
    ];

    let value = result.value.map_or_else(|| "missing".to_string(), format_number);
    match result.direction {
        Some(direction) => lines.push(format!("Value: {value} ({direction})")),
        None => lines.push(format!("Value: {value}")),
    }

    if result.lower_bound.is_some() || result.upper_bound.is_some() {
        let lo = result.lower_bound.map_or_else(|| "-".to_string(), format_number);
        let hi = result.upper_bound.map_or_else(|| "-".to_string(), format_number);
        lines.push(format!("Expected: [{lo} - {hi}]"));
    }
    if let Some(score) = result.score {
        lines.push(format!("Score: {}", format_number(score)));
    }
    if let Some(pct) = result.percent_deviation {
        if pct.is_finite() {
            lines.push(format!("Deviation: {pct:+.1}%"));
        }
    }
    if let Some(id) = result.detector_id() {
        match result.metadata.get("detector_type").and_then(|v| v.as_str()) {
            Some(kind) => lines.push(format!("Detector: {id} ({kind})")),
            None => lines.push(format!("Detector: {id}")),
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn anomaly() -> DetectionResult {
        let mut r = DetectionResult::normal("orders", Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap(), Some(150.0))
            .with_metadata("detector_id", "a1b2c3d4")
            .with_metadata("detector_type", "threshold");
        r.is_anomaly = true;
        r.score = Some(f64::INFINITY);
        r.upper_bound = Some(100.0);
        r.direction = Some(Direction::Up);
        r.percent_deviation = Some(50.0);
        r
    }

    #[test]
    fn default_message_lists_fields() {
        let text = MessageFormatter::new("log", None).unwrap().format(&anomaly()).unwrap();
        assert!(text.starts_with("**ANOMALY DETECTED** `orders`"));
        assert!(text.contains("Time: 2024-02-03 04:05:06 UTC"));
        assert!(text.contains("Value: 150.00 (up)"));
        assert!(text.contains("Expected: [- - 100.00]"));
        assert!(text.contains("Score: ∞"));
        assert!(text.contains("Deviation: +50.0%"));
        assert!(text.contains("Detector: a1b2c3d4 (threshold)"));
    }

    #[test]
    fn custom_template_renders() {
        let f = MessageFormatter::new("log", Some("{{ metric_name }} at {{ timestamp }}: {{ value }}".into())).unwrap();
        assert_eq!(f.format(&anomaly()).unwrap(), "orders at 2024-02-03 04:05:06: 150.0");
    }

    #[test]
    fn invalid_template_is_rejected_early() {
        let err = MessageFormatter::new("webhook", Some("{{ unclosed".into())).unwrap_err();
        assert!(err.to_string().contains("message_template"));
    }
}
