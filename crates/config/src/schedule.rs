//! Cron normalization and due-check helpers.

use chrono::{DateTime, Utc};
use cron::Schedule;

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month day-of-week`.
/// Metric files use standard 5-field cron: `min hour day-of-month month day-of-week`.
pub fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Check if a cron schedule is due at `now`.
///
/// Due when the first tick after `last_run` falls at or before `now`. Without
/// a previous run, ticks within the last day count.
pub fn is_cron_due(schedule: &Schedule, now: DateTime<Utc>, last_run: Option<DateTime<Utc>>) -> bool {
    let check_from = last_run.unwrap_or(now - chrono::Duration::days(1));
    schedule
        .after(&check_from)
        .next()
        .is_some_and(|next| next <= now)
}
