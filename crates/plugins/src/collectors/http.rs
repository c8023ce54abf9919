//! Generic HTTP collector.
//!
//! Fetches a URL and extracts one number from the response, either from a
//! JSON document via a dot path (`data.items[0].value`) or from a plain-text
//! body. No retries: a failed request is a failed collection.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use pulse_core::{parse_params, Collector, DataPoint, Params, PluginError};

const KIND: &str = "http";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ResponseFormat {
    Json,
    Text,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_format() -> ResponseFormat {
    ResponseFormat::Json
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HttpParams {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    query: HashMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default = "default_format")]
    response_format: ResponseFormat,
    #[serde(default)]
    value_path: Option<String>,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

/// Fetches one value from an HTTP endpoint.
///
/// JSON responses are navigated with `value_path`; text responses are parsed
/// as a number. Non-2xx statuses are collection errors. No retries.
#[derive(Debug)]
pub struct HttpCollector {
    url: String,
    method: reqwest::Method,
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
    body: Option<Value>,
    format: ResponseFormat,
    value_path: Vec<PathSegment>,
    client: reqwest::Client,
}

impl HttpCollector {
    pub fn from_params(params: &Params) -> Result<Self, PluginError> {
        let parsed: HttpParams = parse_params(KIND, params)?;

        let url = url::Url::parse(&parsed.url)
            .map_err(|e| PluginError::invalid_params(KIND, format!("invalid url '{}': {e}", parsed.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PluginError::invalid_params(KIND, "url must start with http:// or https://"));
        }

        let method = match parsed.method.to_uppercase().as_str() {
            "GET" => reqwest::Method::GET,
            "POST" => reqwest::Method::POST,
            other => {
                return Err(PluginError::invalid_params(
                    KIND,
                    format!("unsupported method '{other}' (expected GET or POST)"),
                ))
            }
        };

        let value_path = match (parsed.response_format, parsed.value_path.as_deref()) {
            (ResponseFormat::Json, None) => {
                return Err(PluginError::invalid_params(KIND, "value_path is required for json responses"))
            }
            (_, Some(path)) => parse_value_path(path).map_err(|e| PluginError::invalid_params(KIND, e))?,
            (ResponseFormat::Text, None) => Vec::new(),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(parsed.timeout_secs))
            .build()
            .map_err(|e| PluginError::Http(e.to_string()))?;

        Ok(Self {
            url: parsed.url,
            method,
            headers: parsed.headers,
            query: parsed.query,
            body: parsed.body,
            format: parsed.response_format,
            value_path,
            client,
        })
    }

    fn parse_body(&self, body: &str) -> Result<Option<f64>, PluginError> {
        match self.format {
            ResponseFormat::Text => body
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| PluginError::Collection(format!("response is not a number: '{}'", body.trim()))),
            ResponseFormat::Json => {
                let doc: Value = serde_json::from_str(body)
                    .map_err(|e| PluginError::Collection(format!("invalid JSON response: {e}")))?;
                let found = extract(&doc, &self.value_path).ok_or_else(|| {
                    PluginError::Collection("value_path not found in response".to_string())
                })?;
                number_from(found)
            }
        }
    }
}

#[async_trait::async_trait]
impl Collector for HttpCollector {
    async fn collect(&self, at_time: DateTime<Utc>) -> Result<DataPoint, PluginError> {
        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .query(&self.query);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &self.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PluginError::Collection(format!("request to {} failed: {e}", self.url)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PluginError::Collection(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(PluginError::Collection(format!("{} returned {status}", self.url)));
        }

        tracing::debug!(url = %self.url, %status, "http collector response received");
        let value = self.parse_body(&text)?;
        Ok(DataPoint::from_option(at_time, value).with_metadata("source", self.url.clone()))
    }

    async fn close(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

// ── Value paths ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parse `a.b[0].c` into segments.
fn parse_value_path(path: &str) -> Result<Vec<PathSegment>, String> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if !key.is_empty() {
            segments.push(PathSegment::Key(key.to_string()));
        } else if rest.is_empty() {
            return Err(format!("empty segment in value_path '{path}'"));
        }
        while !rest.is_empty() {
            let close = rest
                .find(']')
                .ok_or_else(|| format!("unclosed '[' in value_path '{path}'"))?;
            let index = rest[1..close]
                .parse::<usize>()
                .map_err(|_| format!("invalid index in value_path '{path}'"))?;
            segments.push(PathSegment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(format!("unexpected '{rest}' in value_path '{path}'"));
            }
        }
    }
    Ok(segments)
}

fn extract<'a>(doc: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    path.iter().try_fold(doc, |current, segment| match segment {
        PathSegment::Key(key) => current.get(key.as_str()),
        PathSegment::Index(i) => current.get(*i),
    })
}

/// Numbers pass through, numeric strings are parsed, `null` means missing.
fn number_from(value: &Value) -> Result<Option<f64>, PluginError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| PluginError::Collection(format!("value '{s}' is not numeric"))),
        other => Err(PluginError::Collection(format!("value {other} is not numeric"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: Value) -> Params {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn parses_nested_value_paths() {
        assert_eq!(
            parse_value_path("data.items[0].value").unwrap(),
            vec![
                PathSegment::Key("data".into()),
                PathSegment::Key("items".into()),
                PathSegment::Index(0),
                PathSegment::Key("value".into()),
            ]
        );
        assert_eq!(parse_value_path("[1][2]").unwrap(), vec![PathSegment::Index(1), PathSegment::Index(2)]);
        assert!(parse_value_path("a..b").is_err());
        assert!(parse_value_path("a[x]").is_err());
        assert!(parse_value_path("a[0").is_err());
    }

    #[test]
    fn extracts_values_from_json() {
        let c = HttpCollector::from_params(&params(json!({
            "url": "https://metrics.example.com/api",
            "value_path": "data.series[1].count",
        })))
        .unwrap();
        let body = r#"{"data": {"series": [{"count": 1}, {"count": "42.5"}]}}"#;
        assert_eq!(c.parse_body(body).unwrap(), Some(42.5));
        assert!(c.parse_body(r#"{"data": {}}"#).is_err());
    }

    #[test]
    fn json_null_is_missing() {
        let c = HttpCollector::from_params(&params(json!({
            "url": "http://localhost/x",
            "value_path": "v",
        })))
        .unwrap();
        assert_eq!(c.parse_body(r#"{"v": null}"#).unwrap(), None);
    }

    #[test]
    fn text_format_parses_body() {
        let c = HttpCollector::from_params(&params(json!({
            "url": "http://localhost/count",
            "response_format": "text",
        })))
        .unwrap();
        assert_eq!(c.parse_body(" 17\n").unwrap(), Some(17.0));
        assert!(c.parse_body("n/a").is_err());
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(HttpCollector::from_params(&params(json!({ "url": "ftp://x", "value_path": "v" }))).is_err());
        assert!(HttpCollector::from_params(&params(json!({ "url": "http://x" }))).is_err());
        assert!(HttpCollector::from_params(&params(json!({
            "url": "http://x", "value_path": "v", "method": "DELETE"
        })))
        .is_err());
    }
}
