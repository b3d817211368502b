//! cadence-worker — periodic scan daemon delivering due topic notifications.
//!
//! Rehydrates the recipient directory from the state store, then runs a
//! dispatch scan on a fixed interval until SIGINT. Shutdown is
//! cooperative: an in-progress scan stops between recipients and every
//! committed send is retained.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use cadence_core::config::{load_dotenv, Config};
use cadence_engine::Engine;
use cadence_notify::SmtpTransport;
use cadence_store::JsonFileStore;

/// Periodic dispatch worker for topic notifications.
#[derive(Parser, Debug)]
#[command(name = "cadence-worker", version, about)]
struct Cli {
    /// Run a single scan and exit instead of looping.
    #[arg(long)]
    once: bool,

    /// Seconds between scans (overrides CADENCE_SCAN_INTERVAL_SECS).
    #[arg(long)]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let store = Arc::new(JsonFileStore::new(&config.store.data_path));
    let transport = Arc::new(
        SmtpTransport::from_config(&config.smtp).context("invalid SMTP configuration")?,
    );
    let engine = Arc::new(Engine::rehydrate(store, transport).await);

    if cli.once {
        let report = engine.run_scan(chrono::Utc::now()).await;
        info!(sent = report.sent, failed = report.failed, "single scan finished");
        return Ok(());
    }

    let interval_secs = cli.interval.unwrap_or(config.scheduler.scan_interval_secs);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    info!(interval_secs, "cadence-worker starting");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }

        // The scan runs as its own task so SIGINT is still observed
        // while it is in flight; on signal the scan stops at its next
        // between-recipients checkpoint and committed sends are kept.
        let mut scan = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run_scan(chrono::Utc::now()).await }
        });
        tokio::select! {
            _ = &mut scan => {}
            _ = tokio::signal::ctrl_c() => {
                engine.request_cancel();
                info!("shutdown requested, stopping after the current recipient");
                let _ = scan.await;
                break;
            }
        }
    }

    info!("cadence-worker exited cleanly");
    Ok(())
}
