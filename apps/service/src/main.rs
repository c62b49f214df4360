//! Vigía service entry point: load configuration, restore the persisted
//! host registry and run the monitoring engine until interrupted. Control
//! planes (a chat bot, an HTTP surface) attach through the engine's
//! command API and the alert subscription seam; on its own the service
//! routes delivered alerts into the log.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sondeo::PingProber;

use vigia_service::config::Config;
use vigia_service::monitor::Monitor;
use vigia_service::store::HostStore;

#[derive(Parser)]
#[command(name = "vigia", about = "Continuous network-liveness monitor")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Override the persisted hosts snapshot path
    #[arg(long)]
    hosts_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    let hosts_path = args.hosts_file.unwrap_or_else(|| config.persistence.hosts_file.clone());
    let store = HostStore::new(hosts_path);
    let prober = Arc::new(PingProber::new(config.probe_timeout()));
    let monitor = Monitor::new(&config, store, prober);

    // Alerts go to the log until a control plane attaches its own sink.
    let (sink_id, mut alerts) = monitor.subscribe();
    tokio::spawn(async move {
        while let Some(text) = alerts.recv().await {
            info!("{text}");
        }
    });

    let started = monitor.start_monitoring();
    info!(groups = started, "monitoring started");

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutting down, letting in-flight rounds settle");
    monitor.stop_monitoring();
    monitor.unsubscribe(sink_id);
    Ok(())
}
