use serde::Deserialize;

use pulse_core::{parse_params, AlertOutcome, Alerter, DetectionResult, Params, PluginError};

use super::message::MessageFormatter;

const KIND: &str = "log";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogParams {
    #[serde(default)]
    message_template: Option<String>,
}

/// Writes alerts to the process log at `warn` level.
pub struct LogAlerter {
    formatter: MessageFormatter,
}

impl LogAlerter {
    pub fn from_params(params: &Params) -> Result<Self, PluginError> {
        let parsed: LogParams = parse_params(KIND, params)?;
        Ok(Self {
            formatter: MessageFormatter::new(KIND, parsed.message_template)?,
        })
    }
}

#[async_trait::async_trait]
impl Alerter for LogAlerter {
    async fn send(&self, result: &DetectionResult) -> Result<AlertOutcome, PluginError> {
        let message = self.formatter.format(result)?;
        tracing::warn!(metric = %result.metric_name, timestamp = %result.timestamp, "{message}");
        Ok(AlertOutcome::Sent)
    }

    fn channel_name(&self) -> &str {
        KIND
    }
}
