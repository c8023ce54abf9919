use chrono::{DateTime, Utc};
use serde::Deserialize;

use pulse_core::{parse_params, Collector, DataPoint, Params, PluginError};

#[derive(Debug, Deserialize)]
struct ConstantParams {
    #[serde(default)]
    value: Option<f64>,
}

/// Returns the same value at every execution time. `null` yields missing points.
pub struct ConstantCollector {
    value: Option<f64>,
}

impl ConstantCollector {
    pub fn from_params(params: &Params) -> Result<Self, PluginError> {
        let parsed: ConstantParams = parse_params("constant", params)?;
        Ok(Self { value: parsed.value })
    }
}

#[async_trait::async_trait]
impl Collector for ConstantCollector {
    async fn collect(&self, at_time: DateTime<Utc>) -> Result<DataPoint, PluginError> {
        Ok(DataPoint::from_option(at_time, self.value).with_metadata("source", "constant"))
    }

    async fn close(&self) -> Result<(), PluginError> {
        Ok(())
    }
}
