pub mod cli;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod errors;
pub mod models;
pub mod normalize;
pub mod redaction;
pub mod remote;
pub mod scheduler;
pub mod views;

use crate::cli::{Cli, Command};
use crate::config::DashboardConfig;
use crate::dashboard::Dashboard;
use crate::errors::AppResult;
use crate::models::HistoryFilters;
use crate::normalize::NormalizeOptions;
use anyhow::Context;
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{:#}", error);
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = DashboardConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Err(error) = init_tracing(&config.log_dir, cli.verbose) {
        eprintln!("logging disabled: {}", error);
    }
    tracing::info!(command = ?cli.command, source = ?config.source, "starting");

    match cli.command {
        Command::Inspect { file, json } => cli::run_inspect(&file, &NormalizeOptions::from(&config), json)?,
        Command::Live { once, json } => {
            let dashboard = open_dashboard(config)?;
            let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
            runtime.block_on(cli::run_live(dashboard, once, json))?;
        }
        Command::History {
            date,
            work_order,
            device,
            json,
        } => {
            let dashboard = open_dashboard(config)?;
            let filters = HistoryFilters {
                date,
                work_order,
                device,
            };
            cli::run_history(&dashboard, filters, json)?;
        }
        Command::ClearHistory { confirm, in_place } => {
            let dashboard = open_dashboard(config)?;
            cli::run_clear(&dashboard, &confirm, in_place)?;
        }
    }
    Ok(())
}

/// Validates the config and connects the configured store. Inspecting a local file needs neither.
fn open_dashboard(mut config: DashboardConfig) -> AppResult<Arc<Dashboard>> {
    config.resolve_keyring_token();
    Ok(Arc::new(Dashboard::from_config(config)?))
}

fn init_tracing(log_dir: &Path, verbose: bool) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "ems-console.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let stderr_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(non_blocking))
        .with(stderr_layer)
        .try_init()
        .map_err(|error| error.to_string())
}
