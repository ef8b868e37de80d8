//! shortsync - Dropbox to YouTube publisher

use anyhow::Context;
use clap::{Parser, Subcommand};
use shortsync_common::logging::{init_logging, LogConfig, LogLevel, LoggingGuard};
use shortsync_ingest::config::{self, IngestConfig};
use shortsync_ingest::error::EXIT_CONFIG;
use shortsync_ingest::ledger::{CompletionLedger, FileLedger};
use shortsync_ingest::models::{SweepOutcome, SweepReport};
use shortsync_ingest::{scheduler, setup, IngestError};
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "shortsync")]
#[command(author, version, about = "Publish new Dropbox videos to YouTube, once each, in order")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Load environment from this file instead of ./.env
    #[arg(long, global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the folder until interrupted or a configured bound is reached
    Run,

    /// Perform a single sweep and exit
    Once,

    /// Print the names recorded as published
    Ledger,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The only dotenv read; with --env-file, ./.env is never consulted
    if let Err(e) = config::load_env_file(cli.env_file.as_deref()) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }

    let _guard = match setup_logging(cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(EXIT_CONFIG);
        },
    };

    let result = match cli.command {
        Command::Run => run().await,
        Command::Once => once().await,
        Command::Ledger => print_ledger(),
    };

    if let Err(e) = result {
        error!(exit_code = e.exit_code(), "{}", e);
        eprintln!("Error: {}", e);
        drop(_guard);
        process::exit(e.exit_code());
    }
}

fn setup_logging(verbose: bool) -> anyhow::Result<LoggingGuard> {
    let log_level = if verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("shortsync")
        .build()
        .apply_env()
        .context("invalid logging configuration")?;

    init_logging(&log_config).context("failed to initialize logging")
}

async fn run() -> Result<(), IngestError> {
    let config = IngestConfig::from_env()?;
    let mut pipeline = setup::build_pipeline(&config)?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let summary = scheduler::run(&mut pipeline, &config.poll_policy(), cancel).await?;
    info!(
        sweeps = summary.sweeps,
        failed_sweeps = summary.failed_sweeps,
        published = summary.published,
        reason = %summary.stop_reason,
        "shortsync stopped"
    );
    Ok(())
}

async fn once() -> Result<(), IngestError> {
    let config = IngestConfig::from_env()?;
    let mut pipeline = setup::build_pipeline(&config)?;

    match pipeline.run_once().await {
        Ok(SweepOutcome::NoWork(_)) => info!("Nothing to publish"),
        Ok(SweepOutcome::Completed(report)) => print_published(&report),
        Err(failure) => {
            // Items recorded before the failure still went out
            print_published(&failure.report);
            return Err(failure.into());
        },
    }
    Ok(())
}

fn print_published(report: &SweepReport) {
    for item in &report.published {
        println!("{}\t{}", item.name, item.published_id);
    }
}

fn print_ledger() -> Result<(), IngestError> {
    let path = config::ledger_path_from_lookup(|key| std::env::var(key).ok());
    if !path.exists() {
        warn!(path = %path.display(), "Ledger does not exist yet");
        eprintln!("0 recorded");
        return Ok(());
    }

    let ledger = FileLedger::open(&path)?;
    for name in ledger.names() {
        println!("{}", name);
    }
    eprintln!("{} recorded", ledger.len());
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, finishing current sweep"),
        _ = terminate => info!("Received SIGTERM, finishing current sweep"),
    }

    token.cancel();
}
