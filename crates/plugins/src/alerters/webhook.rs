//! Chat-style webhook alerter (Mattermost / Slack incoming webhooks).
//!
//! Posts `{"text": ..., "username": ..., "channel": ...}`. Cooldown is keyed
//! by metric name and measured in detection time, so a backtest replays the
//! same suppression a live deployment would have seen.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use pulse_core::{parse_params, AlertOutcome, Alerter, DetectionResult, Params, PluginError};

use super::message::MessageFormatter;

const KIND: &str = "webhook";

/// Last successful alert per metric, shared by every webhook instance
/// created from one registry.
#[derive(Debug, Default)]
pub struct CooldownLedger {
    last_sent: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CooldownLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining cooldown for `metric` at `at`, if any.
    async fn remaining(&self, metric: &str, at: DateTime<Utc>, cooldown: Duration) -> Option<Duration> {
        let last_sent = self.last_sent.lock().await;
        let last = last_sent.get(metric)?;
        let elapsed = at - *last;
        (elapsed >= Duration::zero() && elapsed < cooldown).then(|| cooldown - elapsed)
    }

    async fn record(&self, metric: &str, at: DateTime<Utc>) {
        self.last_sent.lock().await.insert(metric.to_string(), at);
    }

    pub async fn clear(&self) {
        self.last_sent.lock().await.clear();
    }
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_cooldown_minutes() -> i64 {
    60
}

fn default_username() -> String {
    "pulse".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WebhookParams {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default = "default_cooldown_minutes")]
    cooldown_minutes: i64,
    #[serde(default)]
    message_template: Option<String>,
    #[serde(default = "default_username")]
    username: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    icon_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct Payload<'a> {
    text: String,
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<&'a str>,
}

/// Posts a JSON message to a chat-style webhook.
///
/// Repeated alerts for one metric are skipped until `cooldown_minutes` have
/// passed since the last successful send, measured on detection timestamps.
#[derive(Debug)]
pub struct WebhookAlerter {
    url: String,
    method: reqwest::Method,
    headers: HashMap<String, String>,
    cooldown: Duration,
    username: String,
    channel: Option<String>,
    icon_url: Option<String>,
    formatter: MessageFormatter,
    ledger: Arc<CooldownLedger>,
    client: reqwest::Client,
}

impl WebhookAlerter {
    pub fn from_params(ledger: Arc<CooldownLedger>, params: &Params) -> Result<Self, PluginError> {
        let parsed: WebhookParams = parse_params(KIND, params)?;

        let url = url::Url::parse(&parsed.url)
            .map_err(|e| PluginError::invalid_params(KIND, format!("invalid url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PluginError::invalid_params(KIND, "url must start with http:// or https://"));
        }
        let method = parsed
            .method
            .to_uppercase()
            .parse::<reqwest::Method>()
            .map_err(|_| PluginError::invalid_params(KIND, format!("invalid HTTP method: {}", parsed.method)))?;
        if parsed.cooldown_minutes < 0 {
            return Err(PluginError::invalid_params(KIND, "cooldown_minutes must be >= 0"));
        }

        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(parsed.timeout_secs))
            .build()
            .map_err(|e| PluginError::Http(e.to_string()))?;

        Ok(Self {
            url: parsed.url,
            method,
            headers: parsed.headers,
            cooldown: Duration::minutes(parsed.cooldown_minutes),
            username: parsed.username,
            channel: parsed.channel,
            icon_url: parsed.icon_url,
            formatter: MessageFormatter::new(KIND, parsed.message_template)?,
            ledger,
            client,
        })
    }

    fn payload(&self, text: String) -> Payload<'_> {
        Payload {
            text,
            username: &self.username,
            channel: self.channel.as_deref(),
            icon_url: self.icon_url.as_deref(),
        }
    }
}

#[async_trait::async_trait]
impl Alerter for WebhookAlerter {
    async fn send(&self, result: &DetectionResult) -> Result<AlertOutcome, PluginError> {
        if let Some(left) = self
            .ledger
            .remaining(&result.metric_name, result.timestamp, self.cooldown)
            .await
        {
            tracing::debug!(metric = %result.metric_name, remaining_secs = left.num_seconds(), "alert suppressed by cooldown");
            return Ok(AlertOutcome::Skipped {
                reason: format!("cooldown active for another {} min", (left.num_seconds() + 59) / 60),
            });
        }

        let text = self.formatter.format(result)?;
        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .json(&self.payload(text));
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| PluginError::Alert(format!("webhook request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(url = %self.url, %status, body = %body_text, "webhook returned non-2xx status");
            return Err(PluginError::Alert(format!("webhook returned {status}: {body_text}")));
        }

        self.ledger.record(&result.metric_name, result.timestamp).await;
        tracing::debug!(url = %self.url, method = %self.method, %status, "webhook alert delivered");
        Ok(AlertOutcome::Sent)
    }

    fn channel_name(&self) -> &str {
        KIND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap()
    }

    fn alerter(ledger: Arc<CooldownLedger>, params: serde_json::Value) -> Result<WebhookAlerter, PluginError> {
        WebhookAlerter::from_params(ledger, params.as_object().unwrap())
    }

    #[tokio::test]
    async fn cooldown_window_uses_detection_time() {
        let ledger = CooldownLedger::new();
        ledger.record("m", at(0)).await;

        let cooldown = Duration::minutes(30);
        assert_eq!(ledger.remaining("m", at(10), cooldown).await, Some(Duration::minutes(20)));
        assert_eq!(ledger.remaining("m", at(30), cooldown).await, None);
        assert_eq!(ledger.remaining("other", at(10), cooldown).await, None);

        ledger.clear().await;
        assert_eq!(ledger.remaining("m", at(10), cooldown).await, None);
    }

    #[tokio::test]
    async fn suppressed_alert_is_skipped_without_request() {
        let ledger = Arc::new(CooldownLedger::new());
        ledger.record("m", at(0)).await;
        // Port 9 is discard; no request is issued while in cooldown.
        let a = alerter(ledger, json!({ "url": "http://127.0.0.1:9/hook", "cooldown_minutes": 15 })).unwrap();

        let outcome = a.send(&DetectionResult::normal("m", at(5), Some(1.0))).await.unwrap();
        assert_eq!(
            outcome,
            AlertOutcome::Skipped {
                reason: "cooldown active for another 10 min".to_string()
            }
        );
    }

    #[test]
    fn payload_omits_empty_fields() {
        let a = alerter(Arc::new(CooldownLedger::new()), json!({ "url": "https://chat.example.com/hooks/x" })).unwrap();
        let payload = serde_json::to_value(a.payload("hi".into())).unwrap();
        assert_eq!(payload, json!({ "text": "hi", "username": "pulse" }));
    }

    #[test]
    fn rejects_bad_params() {
        let ledger = Arc::new(CooldownLedger::new());
        assert!(alerter(ledger.clone(), json!({ "url": "not a url" })).is_err());
        assert!(alerter(ledger.clone(), json!({ "url": "http://x", "cooldown_minutes": -1 })).is_err());
        assert!(alerter(ledger.clone(), json!({ "url": "http://x", "message_template": "{% if %}" })).is_err());
        assert!(alerter(ledger, json!({ "url": "http://x", "retries": 3 })).is_err());
    }
}
