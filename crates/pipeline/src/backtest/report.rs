use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use pulse_core::models::non_finite;
use pulse_core::{CheckResult, Direction};

/// Aggregate outcome of one backtest run.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub run_id: Uuid,
    pub metric_name: String,
    pub total_checks: usize,
    /// Checks with at least one anomalous detection.
    pub anomalies_detected: usize,
    /// Checks where at least one alert was sent.
    pub alerts_sent: usize,
    pub checks_with_errors: usize,
    pub preloaded_points: usize,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub interrupted: bool,
    pub results: Vec<CheckResult>,
}

impl BacktestReport {
    pub fn new(
        metric_name: impl Into<String>,
        results: Vec<CheckResult>,
        preloaded_points: usize,
        warnings: Vec<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        interrupted: bool,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            metric_name: metric_name.into(),
            total_checks: results.len(),
            anomalies_detected: results.iter().filter(|r| r.has_anomaly()).count(),
            alerts_sent: results.iter().filter(|r| r.alert_sent).count(),
            checks_with_errors: results.iter().filter(|r| !r.is_clean()).count(),
            preloaded_points,
            warnings,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
            interrupted,
            results,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::milliseconds(self.duration_ms)
    }

    /// Total detector invocations across all checks.
    pub fn total_detections(&self) -> usize {
        self.results.iter().map(|r| r.detections.len()).sum()
    }

    /// One row per (check, detection); checks without detections get a
    /// single row with empty detection fields.
    pub fn summary_rows(&self) -> Vec<SummaryRow> {
        let mut rows = Vec::with_capacity(self.total_detections().max(self.results.len()));
        for check in &self.results {
            if check.detections.is_empty() {
                rows.push(SummaryRow {
                    timestamp: check.execution_time,
                    detector_id: None,
                    value: check.datapoint.value,
                    is_anomaly: false,
                    score: None,
                    lower_bound: None,
                    upper_bound: None,
                    direction: None,
                    percent_deviation: None,
                    alert_sent: check.alert_sent,
                });
                continue;
            }
            for d in &check.detections {
                rows.push(SummaryRow {
                    timestamp: check.execution_time,
                    detector_id: d.detector_id().map(str::to_string),
                    value: d.value,
                    is_anomaly: d.is_anomaly,
                    score: d.score,
                    lower_bound: d.lower_bound,
                    upper_bound: d.upper_bound,
                    direction: d.direction,
                    percent_deviation: d.percent_deviation,
                    alert_sent: check.alert_sent,
                });
            }
        }
        rows
    }

    pub fn write_csv<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writeln!(writer, "{}", SummaryRow::CSV_HEADER.join(","))?;
        for row in self.summary_rows() {
            writeln!(writer, "{}", row.csv_fields().join(","))?;
        }
        writer.flush()
    }

    pub fn write_json<W: Write>(&self, mut writer: W) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut writer, self).map_err(io::Error::from)?;
        writeln!(writer)?;
        writer.flush()
    }

    /// Write to `path`: JSON for a `.json` extension, CSV otherwise.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            self.write_json(writer)
        } else {
            self.write_csv(writer)
        }
    }
}

/// Flat view of one detection within a backtest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub timestamp: DateTime<Utc>,
    pub detector_id: Option<String>,
    pub value: Option<f64>,
    pub is_anomaly: bool,
    #[serde(with = "non_finite")]
    pub score: Option<f64>,
    #[serde(with = "non_finite")]
    pub lower_bound: Option<f64>,
    #[serde(with = "non_finite")]
    pub upper_bound: Option<f64>,
    pub direction: Option<Direction>,
    #[serde(with = "non_finite")]
    pub percent_deviation: Option<f64>,
    pub alert_sent: bool,
}

impl SummaryRow {
    pub const CSV_HEADER: [&'static str; 10] = [
        "timestamp",
        "detector_id",
        "value",
        "is_anomaly",
        "score",
        "lower_bound",
        "upper_bound",
        "direction",
        "percent_deviation",
        "alert_sent",
    ];

    fn csv_fields(&self) -> Vec<String> {
        vec![
            self.timestamp.to_rfc3339(),
            csv_escape(self.detector_id.as_deref().unwrap_or_default()),
            csv_number(self.value),
            self.is_anomaly.to_string(),
            csv_number(self.score),
            csv_number(self.lower_bound),
            csv_number(self.upper_bound),
            self.direction.map(|d| d.to_string()).unwrap_or_default(),
            csv_number(self.percent_deviation),
            self.alert_sent.to_string(),
        ]
    }
}

fn csv_number(v: Option<f64>) -> String {
    match v {
        None => String::new(),
        Some(v) if v.is_infinite() => if v > 0.0 { "inf" } else { "-inf" }.to_string(),
        Some(v) => v.to_string(),
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
