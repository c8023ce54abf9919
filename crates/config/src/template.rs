//! Minijinja rendering for configuration documents and alert messages.
//!
//! Templates are arbitrary strings (not pre-registered), so a fresh
//! [`minijinja::Environment`] is created per render call. Undefined
//! variables are errors.

use chrono::{DateTime, Utc};
use minijinja::{context, Environment, ErrorKind, UndefinedBehavior};
use serde::Serialize;

use crate::error::{ConfigError, Result};
use crate::timestamp::parse_timestamp;

/// Default layout for `execution_time` and the `datetime_format` filter.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Values available to templates inside a metric document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateContext {
    pub execution_time: DateTime<Utc>,
}

impl TemplateContext {
    pub fn new(execution_time: DateTime<Utc>) -> Self {
        Self { execution_time }
    }

    fn to_value(self) -> minijinja::Value {
        context! {
            execution_time => self.execution_time.format(DEFAULT_DATETIME_FORMAT).to_string(),
            execution_date => self.execution_time.format("%Y-%m-%d").to_string(),
            execution_ts => self.execution_time.timestamp(),
        }
    }
}

/// Renders template strings with the workspace's filters.
#[derive(Debug, Default)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn build_env() -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_filter("datetime_format", datetime_format_filter);
        env.add_filter("round", round_filter);
        env
    }

    /// Render a metric document against the execution-time context.
    pub fn render_document(&self, source: &str, ctx: TemplateContext) -> Result<String> {
        self.render(source, ctx.to_value())
    }

    /// Render any template string with a serializable context.
    pub fn render<S: Serialize>(&self, source: &str, ctx: S) -> Result<String> {
        let env = Self::build_env();
        env.render_str(source, ctx)
            .map_err(|e| ConfigError::Template(e.to_string()))
    }

    /// Check template syntax without evaluating it.
    pub fn validate(&self, source: &str) -> Result<()> {
        let env = Self::build_env();
        env.template_from_str(source)
            .map_err(|e| ConfigError::Template(e.to_string()))?;
        Ok(())
    }
}

/// `{{ value | datetime_format("%Y-%m-%d") }}`: reformat a timestamp string.
fn datetime_format_filter(value: String, fmt: Option<String>) -> std::result::Result<String, minijinja::Error> {
    let parsed = parse_timestamp(&value).ok_or_else(|| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("datetime_format: cannot parse '{value}' as a timestamp"),
        )
    })?;
    let fmt = fmt.as_deref().unwrap_or(DEFAULT_DATETIME_FORMAT);
    Ok(parsed.format(fmt).to_string())
}

/// Round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx() -> TemplateContext {
        TemplateContext::new(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap())
    }

    #[test]
    fn renders_execution_time_fields() {
        let renderer = TemplateRenderer::new();
        let out = renderer
            .render_document("at: '{{ execution_time }}' day: {{ execution_date }} ts: {{ execution_ts }}", ctx())
            .unwrap();
        assert_eq!(out, "at: '2024-01-15 10:00:00' day: 2024-01-15 ts: 1705312800");
    }

    #[test]
    fn datetime_format_filter_reformats() {
        let renderer = TemplateRenderer::new();
        let out = renderer
            .render_document("{{ execution_time | datetime_format('%Y%m%d') }}", ctx())
            .unwrap();
        assert_eq!(out, "20240115");
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let renderer = TemplateRenderer::new();
        let err = renderer.render_document("{{ not_defined }}", ctx()).unwrap_err();
        assert!(matches!(err, ConfigError::Template(_)));
    }

    #[test]
    fn round_filter_in_message_templates() {
        let renderer = TemplateRenderer::new();
        let out = renderer
            .render("score={{ score | round(2) }}", context! { score => 3.14159 })
            .unwrap();
        assert_eq!(out, "score=3.14");
    }

    #[test]
    fn validate_reports_syntax_errors() {
        let renderer = TemplateRenderer::new();
        assert!(renderer.validate("Hello {{ metric_name }}").is_ok());
        assert!(renderer.validate("{{ unclosed").is_err());
    }
}
