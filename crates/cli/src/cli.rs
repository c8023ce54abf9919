use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Scheduled metric checks with pluggable anomaly detection.
///
/// Collects a metric, stores it, runs detectors against its history and
/// alerts on anomalies. Backtests replay the same pipeline over the past.
#[derive(Parser, Debug)]
#[command(name = "pulse", version, about = "Metric monitoring and anomaly detection")]
pub struct CliArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Root directory for the jsonl storage when its params omit `path`
    #[arg(long, global = true, env = "PULSE_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,
}

impl GlobalArgs {
    /// Fallback filter when RUST_LOG is unset.
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one check for a metric configuration
    Run {
        config: PathBuf,

        /// Execution time (defaults to now), e.g. "2024-01-15 10:00:00"
        #[arg(long)]
        execution_time: Option<String>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration and construct its plugins
    Validate { config: PathBuf },

    /// Replay the pipeline over the configured backtest window
    Backtest {
        config: PathBuf,

        /// Write the per-detection summary (.csv) or full report (.json)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// List registered plugin types per role
    ListPlugins,

    /// Load every metric configuration under a directory
    ListMetrics {
        dir: PathBuf,

        /// Show collector, detectors and alerter per metric
        #[arg(long)]
        details: bool,
    },

    /// Delete stored data older than the metric's retention
    Cleanup { config: PathBuf },

    /// Run scheduled metrics from a directory until interrupted
    Watch {
        dir: PathBuf,

        /// Seconds between schedule checks
        #[arg(long, default_value = "30")]
        tick_secs: u64,
    },
}
