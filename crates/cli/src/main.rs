mod cli;
mod commands;
mod output;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use pulse_pipeline::Checker;
use pulse_plugins::{builtin_registry, BuiltinOptions};

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = CliArgs::parse();

    // A missing .env is fine.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.global.log_level())),
        )
        .with_target(false)
        .init();

    let registry = builtin_registry(BuiltinOptions {
        data_dir: args.global.data_dir.clone(),
    })
    .context("failed to register built-in plugins")?;
    let checker = Checker::new(Arc::new(registry));

    match args.command {
        Command::Run {
            config,
            execution_time,
            json,
        } => commands::run(&checker, &config, execution_time.as_deref(), json).await,
        Command::Validate { config } => commands::validate(&checker, &config).await,
        Command::Backtest { config, output } => commands::backtest(checker, &config, output.as_deref()).await,
        Command::ListPlugins => {
            commands::list_plugins(&checker);
            Ok(ExitCode::SUCCESS)
        }
        Command::ListMetrics { dir, details } => commands::list_metrics(&dir, details),
        Command::Cleanup { config } => commands::cleanup(&checker, &config).await,
        Command::Watch { dir, tick_secs } => commands::watch(&checker, &dir, tick_secs).await,
    }
}
