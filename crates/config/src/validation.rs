//! Structural validation of metric documents.
//!
//! Collects every problem with its path instead of stopping at the first, so
//! a single run reports all mistakes in a file. Errors block loading;
//! warnings are advisory and logged by the loader.

use std::collections::HashSet;
use std::str::FromStr;

use pulse_core::identity::{is_valid_identifier, resolve_detector_id};
use pulse_core::window::parse_duration;

use crate::error::{ConfigError, Result};
use crate::schedule::normalize_cron;
use crate::schema::{
    BacktestPlan, BacktestSpec, DetectorConfig, DetectorSpec, MetricDocument, MetricUnit, PluginSpec, StorageSpec,
};
use crate::timestamp::parse_timestamp;

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

/// One problem, located by a dotted path such as `detectors[1].id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
        });
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Validate a document and build the immutable [`MetricUnit`].
///
/// Returns the unit together with any warnings.
pub fn validate_document(doc: MetricDocument) -> Result<(MetricUnit, Vec<ValidationIssue>)> {
    let mut result = ValidationResult::default();

    check_name(&doc.name, &mut result);
    let collector = check_plugin("collector", &doc.collector, &mut result);
    let alerter = check_plugin("alerter", &doc.alerter, &mut result);
    let detectors = check_detectors(doc.detector, doc.detectors, &mut result);
    check_storage(&doc.storage, &mut result);
    let backtest_plan = check_backtest(&doc.backtest, &mut result);
    if let Some(schedule) = &doc.schedule {
        if let Err(e) = cron::Schedule::from_str(&normalize_cron(&schedule.cron)) {
            result.error("schedule.cron", format!("invalid cron expression '{}': {e}", schedule.cron));
        }
    }

    if !result.is_valid() {
        return Err(ConfigError::Validation(
            result.errors.iter().map(ToString::to_string).collect(),
        ));
    }

    let unit = MetricUnit {
        name: doc.name,
        description: doc.description,
        collector,
        detectors,
        alerter,
        storage: doc.storage,
        backtest: doc.backtest,
        backtest_plan,
        schedule: doc.schedule,
        metadata: doc.metadata,
    };
    Ok((unit, result.warnings))
}

// ── Checks ──────────────────────────────────────────────────────────

fn check_name(name: &str, result: &mut ValidationResult) {
    if name.trim().is_empty() {
        result.error("name", "metric name cannot be empty");
    } else if !is_valid_identifier(name) {
        result.error(
            "name",
            format!("metric name '{name}' contains invalid characters; use only alphanumeric, underscore, and dash"),
        );
    }
}

fn check_plugin(path: &str, spec: &PluginSpec, result: &mut ValidationResult) -> PluginSpec {
    let kind = spec.kind.trim();
    if kind.is_empty() {
        result.error(format!("{path}.type"), format!("{path} type cannot be empty"));
    }
    PluginSpec {
        kind: kind.to_string(),
        params: spec.params.clone(),
    }
}

/// Enforce the exclusive singular/plural forms and resolve ids.
fn check_detectors(
    single: Option<DetectorSpec>,
    list: Option<Vec<DetectorSpec>>,
    result: &mut ValidationResult,
) -> Vec<DetectorConfig> {
    let (specs, prefix): (Vec<DetectorSpec>, &str) = match (single, list) {
        (Some(_), Some(_)) => {
            result.error(
                "detector",
                "'detector' and 'detectors' are mutually exclusive; use exactly one",
            );
            return Vec::new();
        }
        (None, None) => {
            result.error("detectors", "a detector is required: set 'detector' or 'detectors'");
            return Vec::new();
        }
        (None, Some(list)) if list.is_empty() => {
            result.error("detectors", "'detectors' must contain at least one entry");
            return Vec::new();
        }
        (Some(single), None) => (vec![single], "detector"),
        (None, Some(list)) => (list, "detectors"),
    };

    let plural = prefix == "detectors";
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(specs.len());

    for (i, spec) in specs.into_iter().enumerate() {
        let path = if plural { format!("{prefix}[{i}]") } else { prefix.to_string() };
        let kind = spec.kind.trim().to_string();
        if kind.is_empty() {
            result.error(format!("{path}.type"), "detector type cannot be empty");
            continue;
        }

        let id = match spec.id {
            Some(id) if !is_valid_identifier(&id) => {
                result.error(
                    format!("{path}.id"),
                    format!("detector id '{id}' contains invalid characters; use only alphanumeric, underscore, and dash"),
                );
                continue;
            }
            Some(id) => id,
            None => resolve_detector_id(&kind, &spec.params),
        };

        if !seen.insert(id.clone()) {
            result.error(format!("{path}.id"), format!("duplicate detector id '{id}'"));
            continue;
        }
        resolved.push(DetectorConfig::new(id, kind, spec.params));
    }
    resolved
}

fn check_storage(storage: &StorageSpec, result: &mut ValidationResult) {
    if storage.retention_days < 1 {
        result.error(
            "storage.retention_days",
            format!("must be at least 1, got {}", storage.retention_days),
        );
    }
    if let Some(kind) = &storage.kind {
        if kind.trim().is_empty() {
            result.error("storage.type", "storage type cannot be empty when set");
        }
    }
    if !storage.enabled && (!storage.params.is_empty() || storage.kind.is_some()) {
        result.warn("storage", "storage is disabled; its type and params are ignored");
    }
}

/// Validate backtest fields and build the plan when enabled.
fn check_backtest(spec: &BacktestSpec, result: &mut ValidationResult) -> Option<BacktestPlan> {
    if !spec.enabled {
        let any_set = spec.data_load_start.is_some()
            || spec.detection_start.is_some()
            || spec.detection_end.is_some()
            || spec.step_interval.is_some();
        if any_set {
            result.warn("backtest.enabled", "backtest fields are set but backtesting is disabled");
        }
        return None;
    }

    let mut timestamp = |field: &str, value: &Option<String>| {
        let path = format!("backtest.{field}");
        match value.as_deref() {
            None => {
                result.error(path, "required when backtesting is enabled");
                None
            }
            Some(raw) => {
                let parsed = parse_timestamp(raw);
                if parsed.is_none() {
                    result.error(path, format!("invalid timestamp '{raw}'"));
                }
                parsed
            }
        }
    };
    let data_load_start = timestamp("data_load_start", &spec.data_load_start);
    let detection_start = timestamp("detection_start", &spec.detection_start);
    let detection_end = timestamp("detection_end", &spec.detection_end);

    let step_interval = match spec.step_interval.as_deref() {
        None => {
            result.error("backtest.step_interval", "required when backtesting is enabled");
            None
        }
        Some(raw) => match parse_duration(raw) {
            Ok(step) if step > chrono::Duration::zero() => Some(step),
            Ok(_) => {
                result.error("backtest.step_interval", format!("step interval '{raw}' must be positive"));
                None
            }
            Err(e) => {
                result.error("backtest.step_interval", e.to_string());
                None
            }
        },
    };

    let (data_load_start, detection_start, detection_end, step_interval) =
        (data_load_start?, detection_start?, detection_end?, step_interval?);

    if data_load_start >= detection_start {
        result.error(
            "backtest.data_load_start",
            format!("data_load_start ({data_load_start}) must be before detection_start ({detection_start})"),
        );
    }
    if detection_start >= detection_end {
        result.error(
            "backtest.detection_start",
            format!("detection_start ({detection_start}) must be before detection_end ({detection_end})"),
        );
    }

    Some(BacktestPlan {
        data_load_start,
        detection_start,
        detection_end,
        step_interval,
    })
}
