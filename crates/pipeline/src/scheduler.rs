//! Per-metric cron scheduling for live runs.
//!
//! Tracks, for each unit with a `schedule`, its cron expression and when it
//! last ran. [`UnitScheduler::due_units`] drives the `watch` loop.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::warn;

use pulse_config::schedule::{is_cron_due, normalize_cron};
use pulse_config::MetricUnit;

/// Scheduling state for a single metric.
#[derive(Debug, Clone)]
pub struct UnitScheduleEntry {
    pub metric_name: String,
    /// Normalized 6-field cron expression.
    pub cron_expression: String,
    pub last_triggered: Option<DateTime<Utc>>,
}

pub struct UnitScheduler {
    entries: HashMap<String, UnitScheduleEntry>,
}

impl UnitScheduler {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Synchronize entries with the current set of units.
    ///
    /// Adds new units, updates changed cron expressions (keeping
    /// `last_triggered`) and drops units that vanished or lost their schedule.
    pub fn sync_units(&mut self, units: &[MetricUnit]) {
        let scheduled: Vec<(&str, &str)> = units
            .iter()
            .filter_map(|u| u.schedule().map(|s| (u.name(), s.cron.as_str())))
            .collect();
        let names: HashSet<&str> = scheduled.iter().map(|(name, _)| *name).collect();
        self.entries.retain(|name, _| names.contains(name.as_str()));

        for (name, cron) in scheduled {
            let cron_expression = normalize_cron(cron);
            match self.entries.get_mut(name) {
                Some(entry) => entry.cron_expression = cron_expression,
                None => {
                    self.entries.insert(
                        name.to_string(),
                        UnitScheduleEntry {
                            metric_name: name.to_string(),
                            cron_expression,
                            last_triggered: None,
                        },
                    );
                }
            }
        }
    }

    /// Whether `metric_name` is due at `now`. Unknown metrics and invalid
    /// cron expressions are never due.
    pub fn should_run(&self, metric_name: &str, now: DateTime<Utc>) -> bool {
        let Some(entry) = self.entries.get(metric_name) else {
            return false;
        };
        match Schedule::from_str(&entry.cron_expression) {
            Ok(schedule) => is_cron_due(&schedule, now, entry.last_triggered),
            Err(e) => {
                warn!(metric = %metric_name, cron = %entry.cron_expression, error = %e, "invalid cron expression");
                false
            }
        }
    }

    pub fn record_trigger(&mut self, metric_name: &str) {
        self.record_trigger_at(metric_name, Utc::now());
    }

    pub fn record_trigger_at(&mut self, metric_name: &str, at: DateTime<Utc>) {
        if let Some(entry) = self.entries.get_mut(metric_name) {
            entry.last_triggered = Some(at);
        }
    }

    /// Metrics due at `now`, sorted by name.
    pub fn due_units(&self, now: DateTime<Utc>) -> Vec<&str> {
        let mut due: Vec<&str> = self
            .entries
            .keys()
            .filter(|name| self.should_run(name, now))
            .map(String::as_str)
            .collect();
        due.sort_unstable();
        due
    }

    pub fn get(&self, metric_name: &str) -> Option<&UnitScheduleEntry> {
        self.entries.get(metric_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for UnitScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pulse_config::ConfigLoader;

    fn unit(name: &str, cron: Option<&str>) -> MetricUnit {
        let schedule = cron.map(|c| format!("schedule:\n  cron: \"{c}\"\n")).unwrap_or_default();
        let yaml = format!(
            "name: {name}\ncollector:\n  type: constant\ndetector:\n  type: missing_data\nalerter:\n  type: log\n{schedule}"
        );
        ConfigLoader::new().load_str(&yaml, None).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    #[test]
    fn sync_tracks_only_scheduled_units() {
        let mut scheduler = UnitScheduler::new();
        scheduler.sync_units(&[unit("a", Some("*/5 * * * *")), unit("b", None)]);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.get("a").unwrap().cron_expression, "0 */5 * * * *");

        scheduler.record_trigger_at("a", at(0, 0));
        scheduler.sync_units(&[unit("a", Some("*/10 * * * *"))]);
        let entry = scheduler.get("a").unwrap();
        assert_eq!(entry.cron_expression, "0 */10 * * * *");
        assert_eq!(entry.last_triggered, Some(at(0, 0)));

        scheduler.sync_units(&[]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn due_after_next_tick() {
        let mut scheduler = UnitScheduler::new();
        scheduler.sync_units(&[unit("b", Some("*/10 * * * *")), unit("a", Some("*/10 * * * *"))]);
        scheduler.record_trigger_at("a", at(1, 0));
        scheduler.record_trigger_at("b", at(1, 0));

        assert!(scheduler.due_units(at(1, 5)).is_empty());
        assert_eq!(scheduler.due_units(at(1, 10)), vec!["a", "b"]);

        scheduler.record_trigger_at("a", at(1, 10));
        assert_eq!(scheduler.due_units(at(1, 12)), vec!["b"]);
        assert!(!scheduler.should_run("unknown", at(1, 12)));
    }
}
