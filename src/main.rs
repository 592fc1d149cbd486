mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use bulkdl::config::{Config, Overrides, Settings, DEFAULT_CONFIG_FILE};
use bulkdl::{downloader, logging, Dispatcher, Ledger, ProgressTable, RunSummary};
use clap::Parser;
use indicatif::HumanBytes;

use crate::cli::Args;

fn main() -> Result<()> {
    let mut args = Args::parse();

    // Relative paths must not depend on where the runtime happens to run
    if args.directory.is_relative() {
        if let Ok(cwd) = std::env::current_dir() {
            args.directory = cwd.join(&args.directory);
        }
    }

    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(|| args.directory.join("bulkdl.log"));
    if let Err(err) = logging::init_logging(&log_file) {
        logging::init_logging_stderr();
        tracing::warn!("cannot log to {}: {:#}, using stderr", log_file.display(), err);
    }

    let config_path = args
        .config_file
        .clone()
        .unwrap_or_else(|| args.directory.join(DEFAULT_CONFIG_FILE));
    let config = Config::load(&config_path)?;
    tracing::info!("using config file {}", config_path.display());

    let overrides = Overrides {
        download_dir: args.download_dir.clone(),
        parallel: args.parallel,
        timeout_secs: args.timeout,
    };
    let settings = Settings::resolve(&args.directory, config, overrides)?;

    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(run(settings, args.quiet))?;

    println!(
        "All downloads finished: {} completed ({}), {} skipped, {} failed",
        summary.completed,
        HumanBytes(summary.bytes_downloaded),
        summary.skipped,
        summary.failed,
    );
    if summary.folder_errors > 0 || summary.ledger_errors > 0 {
        println!(
            "{} folders could not be created, {} ledger writes failed; see the log",
            summary.folder_errors, summary.ledger_errors
        );
    }
    Ok(())
}

async fn run(settings: Settings, quiet: bool) -> Result<RunSummary> {
    let ledger = Ledger::load(&settings.ledger_path)
        .await
        .with_context(|| format!("Failed to load ledger {:?}", settings.ledger_path))?;
    tracing::info!("completion ledger at {}", ledger.path().display());
    ledger.assume_done(settings.assumed_done).await;

    tokio::fs::create_dir_all(&settings.download_dir)
        .await
        .with_context(|| format!("Failed to create download directory {:?}", settings.download_dir))?;

    let progress = if quiet {
        ProgressTable::hidden()
    } else {
        ProgressTable::stdout()
    };

    let client = downloader::build_client().context("Failed to build HTTP client")?;
    let dispatcher = Dispatcher::new(
        client,
        Arc::new(ledger),
        Arc::new(progress),
        settings.options,
    );

    let cancel = dispatcher.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping downloads");
            cancel.cancel();
        }
    });

    dispatcher.run(&settings.spec, &settings.download_dir).await
}
