//! Ferry Ingest - FTP to local XML ingestion service

use anyhow::{Context, Result};
use clap::Parser;
use ferry_common::logging::{init_logging, LogConfig, LogLevel};
use ferry_ingest::config::IngestConfig;
use ferry_ingest::orchestrator::IngestOrchestrator;
use ferry_ingest::remote::FtpSource;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ferry-ingest")]
#[command(author, version, about = "Stage, extract and archive XML files from an FTP directory")]
struct Cli {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Real environment variables win over .env
    dotenvy::dotenv().ok();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("ferry-ingest")
        .build()
        .overlay_env()
        .context("Invalid logging configuration")?;

    let _guard = init_logging(&log_config)?;

    let config = IngestConfig::from_env().context("Failed to load ingestion configuration")?;
    info!(
        ftp = ?config.ftp,
        layout = ?config.layout,
        timing = ?config.timing,
        pattern = %config.name_pattern,
        "Starting ferry-ingest"
    );

    let source = Arc::new(FtpSource::new(config.ftp.clone()));
    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    IngestOrchestrator::new(config, source)
        .run(cancel)
        .await
        .context("Ingestion pipeline failed to start")?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("Received terminate signal, starting graceful shutdown"),
    }
}
