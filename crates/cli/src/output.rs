//! Human-readable summaries for terminal output.

use tracing::{info, warn};

use pulse_config::MetricUnit;
use pulse_core::{CheckResult, DetectionResult};
use pulse_pipeline::BacktestReport;

fn number(v: Option<f64>) -> String {
    match v {
        None => "-".to_string(),
        Some(v) if v.is_infinite() => if v > 0.0 { "inf" } else { "-inf" }.to_string(),
        Some(v) => format!("{v:.2}"),
    }
}

fn detection_line(d: &DetectionResult) -> String {
    let marker = if d.is_anomaly { "ANOMALY" } else { "ok" };
    let mut line = format!(
        "  [{}] {marker}  score={}  bounds=[{}, {}]",
        d.detector_id().unwrap_or("?"),
        number(d.score),
        number(d.lower_bound),
        number(d.upper_bound),
    );
    if let Some(direction) = d.direction {
        line.push_str(&format!("  direction={direction}"));
    }
    line
}

pub fn print_check(result: &CheckResult) {
    println!("{} @ {}", result.metric_name, result.execution_time.format("%Y-%m-%d %H:%M:%S"));
    println!("  value: {}", number(result.datapoint.value));
    for detection in &result.detections {
        println!("{}", detection_line(detection));
    }
    match &result.alert_reason {
        Some(reason) if result.alert_sent => println!("  alert sent: {reason}"),
        _ => println!("  alert sent: no"),
    }
    for error in &result.errors {
        println!("  error: {error}");
    }
}

/// Log form used by `watch`.
pub fn log_check(result: &CheckResult) {
    if result.is_clean() {
        info!(
            metric = %result.metric_name,
            value = ?result.datapoint.value,
            anomalies = result.anomalies().count(),
            alert_sent = result.alert_sent,
            "scheduled check finished"
        );
    } else {
        warn!(
            metric = %result.metric_name,
            errors = %result.errors.join("; "),
            "scheduled check finished with errors"
        );
    }
}

pub fn print_backtest(report: &BacktestReport) {
    println!("Backtest {} ({})", report.metric_name, report.run_id);
    println!("  checks:            {}", report.total_checks);
    println!("  detections:        {}", report.total_detections());
    println!("  anomalous checks:  {}", report.anomalies_detected);
    println!("  alerts sent:       {}", report.alerts_sent);
    println!("  checks w/ errors:  {}", report.checks_with_errors);
    println!("  preloaded points:  {}", report.preloaded_points);
    println!("  duration:          {:.1}s", report.duration_ms as f64 / 1000.0);
    if report.interrupted {
        println!("  interrupted before the last step");
    }
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
}

pub fn print_unit(unit: &MetricUnit) {
    println!("{}", unit.name());
    if let Some(description) = unit.description() {
        println!("  {description}");
    }
    println!("  collector: {}", unit.collector().kind);
    for detector in unit.detectors() {
        println!("  detector:  {} ({})", detector.id(), detector.kind());
    }
    println!("  alerter:   {}", unit.alerter().kind);
    match unit.storage_kind() {
        Some(kind) => println!("  storage:   {kind} (retention {} days)", unit.storage().retention_days),
        None => println!("  storage:   disabled"),
    }
    if let Some(schedule) = unit.schedule() {
        println!("  schedule:  {}", schedule.cron);
    }
    if unit.backtest().enabled {
        println!("  backtest:  enabled");
    }
}
