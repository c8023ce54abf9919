use std::fmt;

use thiserror::Error;

use crate::registry::PluginRole;

/// Errors raised by plugin construction or plugin operations.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("collection failed: {0}")]
    Collection(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("detection failed: {0}")]
    Detection(String),

    #[error("alert delivery failed: {0}")]
    Alert(String),

    #[error("no {role} registered for type '{kind}'")]
    UnknownPlugin { role: PluginRole, kind: String },

    #[error("invalid params for '{kind}': {message}")]
    InvalidParams { kind: String, message: String },

    #[error("{0} is not supported")]
    Unsupported(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginError {
    pub fn invalid_params(kind: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::InvalidParams {
            kind: kind.into(),
            message: message.to_string(),
        }
    }
}

/// Errors raised while parsing a window or interval expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("invalid window expression '{expr}': expected '<amount> <unit>', e.g. '30 days'")]
    Format { expr: String },

    #[error("invalid amount in window expression '{expr}': must be a non-negative integer")]
    Amount { expr: String },

    #[error("unknown unit '{unit}' in window expression '{expr}' (supported: second, minute, hour, day, week)")]
    Unit { expr: String, unit: String },

    #[error("window expression '{expr}' is out of range")]
    Overflow { expr: String },
}

/// Pipeline stage a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    Collect,
    Persist,
    Detect,
    Alert,
    Record,
}

impl Stage {
    /// Whether a failure in this stage stops the remaining stages.
    ///
    /// `Load` failures propagate to the caller; `Collect` failures end the
    /// invocation with a degraded result. Everything later is recorded and
    /// the pipeline moves on.
    pub fn is_fatal(self) -> bool {
        matches!(self, Stage::Load | Stage::Collect)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Collect => "collect",
            Stage::Persist => "persist",
            Stage::Detect => "detect",
            Stage::Alert => "alert",
            Stage::Record => "record",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-configuration failure inside one pipeline stage.
///
/// The message is what ends up in `CheckResult::errors`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Outcome of a single pipeline stage.
pub type StageResult<T> = Result<T, StageFailure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_load_and_collect_are_fatal() {
        assert!(Stage::Load.is_fatal());
        assert!(Stage::Collect.is_fatal());
        for stage in [Stage::Persist, Stage::Detect, Stage::Alert, Stage::Record] {
            assert!(!stage.is_fatal(), "{stage} should not be fatal");
        }
    }

    #[test]
    fn stage_failure_displays_message_only() {
        let failure = StageFailure::new(Stage::Persist, "Failed to save datapoint: disk full");
        assert_eq!(failure.to_string(), "Failed to save datapoint: disk full");
    }

    #[test]
    fn unknown_plugin_names_role_and_kind() {
        let err = PluginError::UnknownPlugin {
            role: PluginRole::Detector,
            kind: "prophet".to_string(),
        };
        assert_eq!(err.to_string(), "no detector registered for type 'prophet'");
    }
}
