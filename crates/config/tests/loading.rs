use std::fs;

use chrono::{Duration, TimeZone, Utc};
use pulse_config::{ConfigError, ConfigLoader, LoadStatus, TemplateContext};
use pulse_core::identity::resolve_detector_id;
use pulse_core::Params;

const BASE: &str = r#"
name: sessions_10min
collector:
  type: constant
  params:
    value: 42
alerter:
  type: log
"#;

fn with(extra: &str) -> String {
    format!("{BASE}{extra}")
}

fn validation_messages(err: ConfigError) -> Vec<String> {
    match err {
        ConfigError::Validation(messages) => messages,
        other => panic!("expected validation error, got {other:?}"),
    }
}

// -- Detector forms ------------------------------------------------------

#[test]
fn single_detector_is_exposed_as_list() {
    let unit = ConfigLoader::new()
        .load_str(&with("detector:\n  type: threshold\n  params:\n    upper: 100\n"), None)
        .unwrap();

    assert_eq!(unit.detectors().len(), 1);
    assert_eq!(unit.detectors()[0].kind(), "threshold");
    let params: Params = serde_json::from_str(r#"{"upper": 100}"#).unwrap();
    assert_eq!(unit.detectors()[0].id(), resolve_detector_id("threshold", &params));
}

#[test]
fn detector_list_keeps_order_and_manual_ids() {
    let yaml = with(
        r#"
detectors:
  - id: upper_guard
    type: threshold
    params: { upper: 100 }
  - type: missing_data
"#,
    );
    let unit = ConfigLoader::new().load_str(&yaml, None).unwrap();
    let ids: Vec<&str> = unit.detectors().iter().map(|d| d.id()).collect();
    assert_eq!(ids[0], "upper_guard");
    assert_eq!(ids[1], resolve_detector_id("missing_data", &Params::new()));
}

#[test]
fn both_detector_forms_are_rejected() {
    let yaml = with("detector:\n  type: threshold\ndetectors:\n  - type: missing_data\n");
    let messages = validation_messages(ConfigLoader::new().load_str(&yaml, None).unwrap_err());
    assert!(messages.iter().any(|m| m.contains("mutually exclusive")));
}

#[test]
fn missing_detector_is_rejected() {
    let messages = validation_messages(ConfigLoader::new().load_str(BASE, None).unwrap_err());
    assert!(messages.iter().any(|m| m.contains("a detector is required")));
}

#[test]
fn empty_detector_list_is_rejected() {
    let messages =
        validation_messages(ConfigLoader::new().load_str(&with("detectors: []\n"), None).unwrap_err());
    assert!(messages.iter().any(|m| m.contains("at least one")));
}

#[test]
fn duplicate_resolved_ids_are_rejected() {
    // The second entry spells out the default operator, so both hash the same.
    let yaml = with(
        r#"
detectors:
  - type: threshold
    params: { upper: 100 }
  - type: threshold
    params: { upper: 100, operator: outside }
"#,
    );
    let messages = validation_messages(ConfigLoader::new().load_str(&yaml, None).unwrap_err());
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("detectors[1].id: duplicate detector id"));
}

#[test]
fn invalid_manual_id_is_rejected() {
    let yaml = with("detector:\n  id: 'has space'\n  type: threshold\n");
    let messages = validation_messages(ConfigLoader::new().load_str(&yaml, None).unwrap_err());
    assert!(messages[0].starts_with("detector.id:"));
}

// -- Top-level fields ----------------------------------------------------

#[test]
fn all_problems_are_reported_together() {
    let yaml = r#"
name: "bad name"
collector:
  type: "  "
alerter:
  type: log
detector:
  type: threshold
storage:
  retention_days: 0
"#;
    let messages = validation_messages(ConfigLoader::new().load_str(yaml, None).unwrap_err());
    assert_eq!(messages.len(), 3, "{messages:?}");
}

#[test]
fn detector_and_storage_problems_are_reported_together() {
    let yaml = with(
        r#"
detector:
  type: threshold
detectors:
  - type: missing_data
storage:
  type: "  "
  retention_days: 0
"#,
    );
    let messages = validation_messages(ConfigLoader::new().load_str(&yaml, None).unwrap_err());
    assert_eq!(messages.len(), 3, "{messages:?}");
    assert!(messages.iter().any(|m| m.contains("mutually exclusive")));
    assert!(messages.iter().any(|m| m.contains("storage.retention_days")));
    assert!(messages.iter().any(|m| m.contains("storage.type")));
}

#[test]
fn unknown_fields_are_rejected() {
    let yaml = with("detector:\n  type: threshold\ncolour: blue\n");
    let err = ConfigLoader::new().load_str(&yaml, None).unwrap_err();
    assert!(matches!(err, ConfigError::Yaml(_)));
}

#[test]
fn non_mapping_document_is_rejected() {
    let err = ConfigLoader::new().load_str("- just\n- a list\n", None).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn storage_defaults_to_enabled_with_collector_type() {
    let unit = ConfigLoader::new()
        .load_str(&with("detector:\n  type: threshold\n"), None)
        .unwrap();
    assert!(unit.storage().enabled);
    assert_eq!(unit.storage().retention_days, 90);
    assert_eq!(unit.storage_kind(), Some("constant"));
}

#[test]
fn disabled_storage_has_no_kind() {
    let unit = ConfigLoader::new()
        .load_str(&with("detector:\n  type: threshold\nstorage:\n  enabled: false\n"), None)
        .unwrap();
    assert_eq!(unit.storage_kind(), None);
}

#[test]
fn invalid_cron_is_rejected() {
    let yaml = with("detector:\n  type: threshold\nschedule:\n  cron: 'every tuesday'\n");
    let messages = validation_messages(ConfigLoader::new().load_str(&yaml, None).unwrap_err());
    assert!(messages[0].starts_with("schedule.cron:"));
}

// -- Backtest ------------------------------------------------------------

#[test]
fn backtest_plan_is_parsed() {
    let yaml = with(
        r#"
detector:
  type: threshold
backtest:
  enabled: true
  data_load_start: "2024-01-01"
  detection_start: "2024-01-01 01:00:00"
  detection_end: "2024-01-01T02:40:00Z"
  step_interval: "10 minutes"
"#,
    );
    let unit = ConfigLoader::new().load_str(&yaml, None).unwrap();
    let plan = unit.backtest_plan().unwrap();
    assert_eq!(plan.detection_start, Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap());
    assert_eq!(plan.step_interval, Duration::minutes(10));
    assert_eq!(plan.total_steps(), 10);
}

#[test]
fn backtest_requires_fields_when_enabled() {
    let yaml = with("detector:\n  type: threshold\nbacktest:\n  enabled: true\n");
    let messages = validation_messages(ConfigLoader::new().load_str(&yaml, None).unwrap_err());
    assert_eq!(messages.len(), 4);
}

#[test]
fn backtest_ordering_is_strict() {
    let yaml = with(
        r#"
detector:
  type: threshold
backtest:
  enabled: true
  data_load_start: "2024-02-01"
  detection_start: "2024-02-01"
  detection_end: "2024-01-01"
  step_interval: "1 hour"
"#,
    );
    let messages = validation_messages(ConfigLoader::new().load_str(&yaml, None).unwrap_err());
    assert_eq!(messages.len(), 2, "{messages:?}");
}

#[test]
fn disabled_backtest_has_no_plan() {
    let unit = ConfigLoader::new()
        .load_str(&with("detector:\n  type: threshold\n"), None)
        .unwrap();
    assert!(matches!(unit.backtest_plan(), Err(ConfigError::BacktestDisabled(_))));
}

// -- Substitution and templates -----------------------------------------

#[test]
fn env_defaults_and_templates_apply_in_order() {
    let yaml = r#"
name: ${PULSE_TEST_UNSET_METRIC:-templated}
collector:
  type: constant
  params:
    query: "SELECT 1 WHERE ts <= '{{ execution_time }}'"
alerter:
  type: log
detector:
  type: threshold
"#;
    let ctx = TemplateContext::new(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
    let unit = ConfigLoader::new().load_str(yaml, Some(ctx)).unwrap();
    assert_eq!(unit.name(), "templated");
    assert_eq!(
        unit.collector().params["query"],
        "SELECT 1 WHERE ts <= '2024-01-15 10:00:00'"
    );
}

#[test]
fn templates_are_untouched_without_context() {
    let yaml = r#"
name: raw
collector:
  type: constant
  params:
    query: "{{ execution_time }}"
alerter:
  type: log
detector:
  type: threshold
"#;
    let unit = ConfigLoader::new().load_str(yaml, None).unwrap();
    assert_eq!(unit.collector().params["query"], "{{ execution_time }}");
}

#[test]
fn raw_blocks_keep_message_templates_for_alerters() {
    let yaml = r#"
name: latency
collector:
  type: constant
alerter:
  type: webhook
  params:
    message_template: "{% raw %}{{ metric_name }} at {{ value }}{% endraw %}"
detector:
  type: threshold
"#;
    let ctx = TemplateContext::new(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
    let unit = ConfigLoader::new().load_str(yaml, Some(ctx)).unwrap();
    assert_eq!(
        unit.alerter().params["message_template"],
        "{{ metric_name }} at {{ value }}"
    );
}

#[test]
fn missing_env_var_fails_loading() {
    let yaml = with("detector:\n  type: threshold\nmetadata:\n  owner: ${PULSE_TEST_DEFINITELY_UNSET}\n");
    let err = ConfigLoader::new().load_str(&yaml, None).unwrap_err();
    assert!(matches!(err, ConfigError::EnvVar(ref name) if name == "PULSE_TEST_DEFINITELY_UNSET"));
}

// -- Files and directories ----------------------------------------------

#[test]
fn load_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    fs::write(&path, "name: broken\n").unwrap();

    let err = ConfigLoader::new().load_file(&path, None).unwrap_err();
    assert!(err.to_string().contains("broken.yaml"));
}

#[test]
fn load_dir_scans_recursively_and_reports_each_file() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("team");
    fs::create_dir(&nested).unwrap();

    fs::write(dir.path().join("a.yaml"), with("detector:\n  type: threshold\n")).unwrap();
    fs::write(
        nested.join("b.yml"),
        with("detector:\n  type: threshold\n").replace("sessions_10min", "orders"),
    )
    .unwrap();
    fs::write(nested.join("dup.yaml"), with("detector:\n  type: missing_data\n")).unwrap();
    fs::write(dir.path().join(".hidden.yaml"), "ignored").unwrap();
    fs::write(dir.path().join("README.md"), "# metrics").unwrap();

    let loaded = ConfigLoader::new().load_dir(dir.path()).unwrap();
    let mut names: Vec<&str> = loaded.units.iter().map(|u| u.name()).collect();
    names.sort();
    assert_eq!(names, vec!["orders", "sessions_10min"]);

    let skipped = loaded
        .results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Skipped { .. }))
        .count();
    let failed: Vec<_> = loaded
        .results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Failed { .. }))
        .collect();
    assert_eq!(skipped, 2);
    assert_eq!(failed.len(), 1);
    assert!(failed[0].path.ends_with("team/dup.yaml"));
}

#[test]
fn load_dir_requires_directory() {
    let dir = tempfile::tempdir().unwrap();
    assert!(ConfigLoader::new().load_dir(&dir.path().join("nope")).is_err());
}
