//! Cache Sync - Main entry point
//!
//! Uploads the date-partitioned stats cache to the object store and prints the
//! run summary as JSON on stdout.

use cache_sync::cli::Args;
use cache_sync::config::Config;
use cache_sync::daemon::shutdown::ShutdownCoordinator;
use cache_sync::store::HttpObjectStore;
use cache_sync::sync::{SyncEngine, UploadSummary};
use cache_sync::utils;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

const EXIT_FILE_FAILURES: u8 = 1;
const EXIT_AUTH_ABORT: u8 = 2;
const EXIT_NO_WORK: u8 = 3;

fn exit_code(summary: &UploadSummary) -> ExitCode {
    if summary.auth_error {
        ExitCode::from(EXIT_AUTH_ABORT)
    } else if summary.files_failed() > 0 || summary.manifest_write_error {
        ExitCode::from(EXIT_FILE_FAILURES)
    } else {
        ExitCode::SUCCESS
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    config.apply_env();

    // Initialize logging
    let log_level = args.log_level.clone().unwrap_or_else(|| config.log.level.clone());
    utils::logger::init(&log_level)?;

    tracing::info!("Starting cache-sync v{}", env!("CARGO_PKG_VERSION"));

    let options = match args.into_options(&config) {
        Ok(options) => options,
        Err(e) => {
            tracing::error!("{}", e);
            return Ok(ExitCode::from(EXIT_NO_WORK));
        }
    };

    let store = HttpObjectStore::new(
        &config.store.endpoint,
        config.store.token.clone(),
        config.store_timeout(),
    )?;

    let cancel = ShutdownCoordinator::new().listen();
    let engine = SyncEngine::new(Arc::new(store)).with_cancel(cancel);

    let summary = match engine.run(&options).await {
        Ok(summary) => summary,
        Err(e) if e.is_no_work() => {
            tracing::error!("{}", e);
            return Ok(ExitCode::from(EXIT_NO_WORK));
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(exit_code(&summary))
}
