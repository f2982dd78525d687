//! promoterd - continuous deployment watcher
//!
//! Polls the staging root for delivered artifacts, promotes them into the
//! runtime directory and restarts the matching service.

use anyhow::{Context, Result};
use clap::Parser;
use promoterd::cli::Cli;
use promoterd::{logging, CommandServiceManager, Watcher};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    let _log_guard = logging::init(&config.logging)?;

    info!("promoterd v{} starting", env!("CARGO_PKG_VERSION"));

    let manager = CommandServiceManager::from_config(&config);
    let watcher = Watcher::new(&config, Box::new(manager)).with_dry_run(cli.dry_run);

    if cli.once {
        let report = tokio::task::spawn_blocking(move || watcher.run_cycle())
            .await
            .context("Cycle panicked")?;
        report.log_summary();
        return Ok(if report.is_clean() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!("Failed to listen for ctrl-c: {}", e);
                }
                info!("Received SIGINT, finishing current cycle");
            }
            _ = sigterm.recv() => info!("Received SIGTERM, finishing current cycle"),
        }
        let _ = shutdown_tx.send(true);
    });

    Arc::new(watcher).run(shutdown_rx).await;

    info!("Shutting down gracefully");
    Ok(ExitCode::SUCCESS)
}
