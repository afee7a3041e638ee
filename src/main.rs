//! MySQL backup runner
//!
//! Dumps MySQL databases, compresses the dump, applies the retention policy to
//! backups already stored in an S3-compatible bucket, uploads the new archive
//! and reports the outcome to a Telegram channel. Meant to be run from cron.

// dbbackup/src/main.rs
mod backup;
mod config;
mod errors;
mod notify;
mod storage;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use backup::{report_outcome, run_backup_flow, RunOutcome, TargetFlags};
use config::{AppConfig, TelegramConfig, DEFAULT_CONFIG_FILE};
use notify::TelegramNotifier;

#[derive(Parser, Debug)]
#[command(name = "dbbackup")]
#[command(about = "Take backup of MySQL database(s) and upload it to S3-compatible object storage.")]
struct Cli {
    /// Force to take backup of all the databases, ignoring the configured list.
    #[arg(long = "all-databases", alias = "allDatabases")]
    all_databases: bool,

    /// Include system databases in the backup.
    #[arg(long = "include-system-databases", alias = "includeSystemDatabases")]
    include_system_databases: bool,

    /// Path of the KEY=VALUE configuration file.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run_app(cli).await {
        Ok(outcome) if outcome.success => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<RunOutcome> {
    tracing::info!(config = %cli.config.display(), "Extracting config data");
    let values = config::load_env_file(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    // Without a usable notifier there is nobody to report to but the log.
    let telegram = TelegramConfig::from_map(&values).context("Invalid Telegram configuration")?;
    let notifier = TelegramNotifier::new(&telegram).context("Failed to set up Telegram notifier")?;

    let app_config = match AppConfig::from_map(&values) {
        Ok(app_config) => app_config,
        Err(e) => {
            let outcome = RunOutcome::failure(e.to_string());
            report_outcome(&notifier, &outcome).await;
            return Ok(outcome);
        }
    };

    let flags = TargetFlags {
        all_databases: cli.all_databases,
        include_system_databases: cli.include_system_databases,
    };
    Ok(run_backup_flow(&app_config, flags, &notifier).await)
}
