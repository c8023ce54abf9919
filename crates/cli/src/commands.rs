//! Subcommand handlers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use pulse_config::timestamp::parse_timestamp;
use pulse_config::{ConfigLoader, LoadStatus, TemplateContext};
use pulse_core::PluginRole;
use pulse_pipeline::{Backtester, Checker, ConfigSource, UnitScheduler};

use crate::output;

pub async fn run(checker: &Checker, config: &Path, execution_time: Option<&str>, json: bool) -> Result<ExitCode> {
    let at = execution_time
        .map(|raw| parse_timestamp(raw).ok_or_else(|| anyhow!("invalid execution time '{raw}'")))
        .transpose()?;

    let result = checker
        .execute(&ConfigSource::File(config.to_path_buf()), at)
        .await
        .with_context(|| format!("failed to load {}", config.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        output::print_check(&result);
    }
    Ok(if result.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub async fn validate(checker: &Checker, config: &Path) -> Result<ExitCode> {
    let unit = checker
        .load(
            &ConfigSource::File(config.to_path_buf()),
            Some(TemplateContext::new(Utc::now())),
        )
        .with_context(|| format!("invalid configuration {}", config.display()))?;

    let problems = checker.validate_plugins(&unit).await;
    if problems.is_empty() {
        println!("OK  {} ({} detector(s))", unit.name(), unit.detectors().len());
        for detector in unit.detectors() {
            println!("    {}  {}", detector.id(), detector.kind());
        }
        return Ok(ExitCode::SUCCESS);
    }

    println!("FAIL  {}", unit.name());
    for problem in &problems {
        println!("    {problem}");
    }
    Ok(ExitCode::FAILURE)
}

pub async fn backtest(checker: Checker, config: &Path, output_path: Option<&Path>) -> Result<ExitCode> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current step");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let backtester = Backtester::new(checker).with_cancel_flag(cancel);
    let report = backtester
        .run(&ConfigSource::File(config.to_path_buf()))
        .await
        .with_context(|| format!("backtest failed for {}", config.display()))?;

    output::print_backtest(&report);
    if let Some(path) = output_path {
        report
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Report written to {}", path.display());
    }
    Ok(if report.interrupted {
        ExitCode::from(130)
    } else {
        ExitCode::SUCCESS
    })
}

pub fn list_plugins(checker: &Checker) {
    for role in PluginRole::ALL {
        println!("{role}: {}", checker.registry().kinds(role).join(", "));
    }
}

pub fn list_metrics(dir: &Path, details: bool) -> Result<ExitCode> {
    let loaded = ConfigLoader::new()
        .load_dir(dir)
        .with_context(|| format!("failed to scan {}", dir.display()))?;

    let mut failed = false;
    for result in &loaded.results {
        match &result.status {
            LoadStatus::Loaded { name } => println!("OK    {name}  ({})", result.path.display()),
            LoadStatus::Skipped { reason } => println!("SKIP  {}  ({reason})", result.path.display()),
            LoadStatus::Failed { error } => {
                failed = true;
                println!("FAIL  {}  {error}", result.path.display());
            }
        }
    }

    if details {
        for unit in &loaded.units {
            output::print_unit(unit);
        }
    }
    println!("{} metric(s) loaded", loaded.units.len());
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

pub async fn cleanup(checker: &Checker, config: &Path) -> Result<ExitCode> {
    let unit = checker
        .load(
            &ConfigSource::File(config.to_path_buf()),
            Some(TemplateContext::new(Utc::now())),
        )
        .with_context(|| format!("invalid configuration {}", config.display()))?;

    let counts = checker
        .cleanup(&unit, Utc::now())
        .await
        .with_context(|| format!("cleanup failed for '{}'", unit.name()))?;
    println!(
        "{}: deleted {} datapoint(s), {} detection(s) older than {} day(s)",
        unit.name(),
        counts.datapoints_deleted,
        counts.detections_deleted,
        unit.storage().retention_days
    );
    Ok(ExitCode::SUCCESS)
}

/// Reload `dir` every tick and run whatever is due. Stops on ctrl-c.
pub async fn watch(checker: &Checker, dir: &Path, tick_secs: u64) -> Result<ExitCode> {
    if tick_secs == 0 {
        bail!("--tick-secs must be at least 1");
    }
    let loader = ConfigLoader::new();
    let mut scheduler = UnitScheduler::new();
    let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
    info!(dir = %dir.display(), tick_secs, "watching metric configurations");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received; stopping");
                return Ok(ExitCode::SUCCESS);
            }
            _ = interval.tick() => {}
        }

        let loaded = match loader.load_dir(dir) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to scan configuration directory");
                continue;
            }
        };
        let paths: HashMap<String, PathBuf> = loaded
            .results
            .iter()
            .filter_map(|r| match &r.status {
                LoadStatus::Loaded { name } => Some((name.clone(), r.path.clone())),
                _ => None,
            })
            .collect();
        scheduler.sync_units(&loaded.units);

        let now = Utc::now();
        let due: Vec<String> = scheduler.due_units(now).into_iter().map(str::to_string).collect();
        for name in due {
            scheduler.record_trigger_at(&name, now);
            let Some(path) = paths.get(&name) else {
                continue;
            };
            match checker.execute(&ConfigSource::File(path.clone()), Some(now)).await {
                Ok(result) => output::log_check(&result),
                Err(e) => warn!(metric = %name, error = %e, "scheduled check could not load its configuration"),
            }
        }
    }
}
