//! nifi-coordinator
//!
//! Converges NiFi clusters toward a declared configuration document, either
//! once or continuously in watch mode.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nfc_coordinator::sync::AccessPolicyCatalog;
use nfc_coordinator::{Configuration, Coordinator, HttpConnector, WatchSettings, Watcher};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Parser)]
#[command(name = "nifi-coordinator")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration document (YAML, TOML or JSON).
    #[arg(long, short, env = "NFC_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Keep running and reconcile whenever the configuration changes.
    #[arg(long, env = "NFC_WATCH")]
    watch: bool,

    /// Seconds between configuration polls in watch mode.
    #[arg(long, env = "NFC_POLL_INTERVAL_SECS", default_value_t = 5)]
    poll_interval_secs: u64,

    /// Re-run without changes after this many seconds in watch mode.
    #[arg(long, env = "NFC_RESYNC_INTERVAL_SECS")]
    resync_interval_secs: Option<u64>,

    /// Per request timeout in seconds.
    #[arg(long, env = "NFC_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// Number of clusters reconciled at once.
    #[arg(long, env = "NFC_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, env = "NFC_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format.
    #[arg(long, env = "NFC_LOG_FORMAT", value_enum, default_value = "json")]
    log_format: LogFormat,
}

impl Cli {
    fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.log_level));
        let registry = tracing_subscriber::registry().with(filter);

        match self.log_format {
            LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
            LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        }
    }

    async fn run(self) -> Result<()> {
        let coordinator =
            Coordinator::new(AccessPolicyCatalog::standard()).with_concurrency(self.concurrency);
        let connector = Arc::new(HttpConnector::new(Duration::from_secs(
            self.request_timeout_secs,
        )));

        if !self.watch {
            let configuration = Configuration::load_from_file(&self.config)
                .with_context(|| format!("loading {}", self.config.display()))?;
            coordinator.run(&configuration, connector.as_ref()).await;
            return Ok(());
        }

        let settings = WatchSettings {
            path: self.config.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            resync_interval: self.resync_interval_secs.map(Duration::from_secs),
        };
        let mut watcher = Watcher::new(settings, coordinator, connector);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
            }
            _ = watcher.run(shutdown_rx) => {
                info!("Watch loop exited");
            }
        }

        let _ = shutdown_tx.send(true);
        info!("Coordinator shutdown complete");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.init_tracing();

    info!(config = %cli.config.display(), watch = cli.watch, "Starting nifi-coordinator");

    if let Err(e) = cli.run().await {
        error!(error = %format!("{e:#}"), "Coordinator failed");
        std::process::exit(1);
    }

    Ok(())
}
