//! Backtest simulator: replays the pipeline over historical execution times.
//!
//! Every step is a regular [`Checker::execute`] call with the execution time
//! set to the simulated instant, so templates, storage and alert cooldowns
//! behave as they would have live.

mod report;

pub use report::{BacktestReport, SummaryRow};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use pulse_config::{BacktestPlan, ConfigError, MetricUnit};

use crate::checker::Checker;
use crate::source::ConfigSource;

/// Log progress at least this often, in steps.
const PROGRESS_EVERY: u64 = 100;

pub struct Backtester {
    checker: Checker,
    cancel: Option<Arc<AtomicBool>>,
}

impl Backtester {
    pub fn new(checker: Checker) -> Self {
        Self { checker, cancel: None }
    }

    /// Stop between steps once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn checker(&self) -> &Checker {
        &self.checker
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Run the backtest configured in `source`.
    ///
    /// The unit is loaded and the plan checked before the first step; a
    /// configuration error during any step aborts the run.
    pub async fn run(&self, source: &ConfigSource) -> Result<BacktestReport, ConfigError> {
        let unit = self.checker.load(source, None)?;
        if !unit.backtest().enabled {
            return Err(ConfigError::BacktestDisabled(unit.name().to_string()));
        }
        let plan = *unit.backtest_plan()?;

        let started_at = Utc::now();
        let total_steps = plan.total_steps();
        let log_every = (total_steps / 10).max(1);
        info!(
            metric = %unit.name(),
            from = %plan.detection_start,
            to = %plan.detection_end,
            step = %pulse_core::window::format_duration(plan.step_interval),
            total_steps,
            "backtest started"
        );

        let mut warnings = Vec::new();
        let preloaded_points = self.preload(&unit, &plan, &mut warnings).await;

        let mut results = Vec::new();
        let mut interrupted = false;
        let mut current = plan.detection_start;
        let mut step: u64 = 0;
        while current <= plan.detection_end {
            if self.cancelled() {
                warn!(metric = %unit.name(), completed = step, "backtest interrupted");
                interrupted = true;
                break;
            }

            let result = self.checker.execute(source, Some(current)).await?;
            results.push(result);
            step += 1;

            if step % log_every == 0 || step % PROGRESS_EVERY == 0 {
                info!(metric = %unit.name(), step, total_steps, at = %current, "backtest progress");
            }

            match current.checked_add_signed(plan.step_interval) {
                Some(next) => current = next,
                None => break,
            }
        }

        let report = BacktestReport::new(
            unit.name(),
            results,
            preloaded_points,
            warnings,
            started_at,
            Utc::now(),
            interrupted,
        );
        info!(
            metric = %report.metric_name,
            checks = report.total_checks,
            anomalies = report.anomalies_detected,
            alerts = report.alerts_sent,
            errors = report.checks_with_errors,
            "backtest finished"
        );
        Ok(report)
    }

    /// Load `[data_load_start, detection_start)` into storage when the
    /// collector can bulk load. Problems become warnings.
    async fn preload(&self, unit: &MetricUnit, plan: &BacktestPlan, warnings: &mut Vec<String>) -> usize {
        let Some(storage_kind) = unit.storage_kind() else {
            return 0;
        };
        if plan.data_load_start >= plan.detection_start {
            return 0;
        }

        let registry = self.checker.registry();
        let spec = unit.collector();
        let collector = match registry.create_collector(&spec.kind, &spec.params) {
            Ok(c) => c,
            Err(e) => {
                warnings.push(format!("Preload skipped, collector unavailable: {e}"));
                return 0;
            }
        };

        let points = match collector.as_bulk() {
            Some(bulk) => bulk.collect_bulk(plan.data_load_start, plan.detection_start).await,
            None => {
                debug!(collector = %spec.kind, "collector cannot bulk load; skipping preload");
                Ok(Vec::new())
            }
        };
        if let Err(e) = collector.close().await {
            warnings.push(format!("Failed to close collector after preload: {e}"));
        }
        let points = match points {
            Ok(points) if points.is_empty() => return 0,
            Ok(points) => points,
            Err(e) => {
                warnings.push(format!("Preload failed: {e}"));
                return 0;
            }
        };

        let storage = match registry.create_storage(storage_kind, &unit.storage().params) {
            Ok(s) => s,
            Err(e) => {
                warnings.push(format!("Preload skipped, storage unavailable: {e}"));
                return 0;
            }
        };

        let mut saved = 0;
        let mut failed = 0;
        for point in &points {
            match storage.save_datapoint(unit.name(), point).await {
                Ok(()) => saved += 1,
                Err(e) => {
                    failed += 1;
                    debug!(error = %e, at = %point.timestamp, "preload write failed");
                }
            }
        }
        if failed > 0 {
            warnings.push(format!("Failed to preload {failed} of {} datapoints", points.len()));
        }
        if let Err(e) = storage.close().await {
            warnings.push(format!("Failed to close storage after preload: {e}"));
        }
        info!(metric = %unit.name(), saved, "historical data preloaded");
        saved
    }
}
