//! Netmonitor Binary Entry Point
//!
//! Runs the usage monitor as a standalone agent against `/proc`.
//! Core functionality is provided by the `netmonitor` library crate.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use netmonitor::{
    AppConfig, CallSiteAttributor, CallSiteRegistry, HttpReporter, PollingScheduler,
    ProcNetDevSource, QueuedReporter, UsageSampler, config::parse_duration,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Netmonitor - per-call-site network usage attribution
#[derive(Parser, Debug)]
#[command(name = "netmonitor", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "NETMONITOR_CONFIG"
    )]
    config: String,

    /// Collector endpoint (overrides config file)
    #[arg(long, env = "NETMONITOR_ENDPOINT")]
    endpoint: Option<String>,

    /// Process to monitor (overrides config file)
    #[arg(long, env = "NETMONITOR_PID")]
    pid: Option<u32>,

    /// Poll cadence, e.g. `250ms` (overrides config file)
    #[arg(long, env = "NETMONITOR_CADENCE", value_parser = parse_duration)]
    cadence: Option<Duration>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,netmonitor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Netmonitor - per-call-site network usage attribution");

    let cli = Cli::parse();

    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // CLI > ENV > config file
    if let Some(endpoint) = cli.endpoint {
        config.reporter.endpoint = endpoint;
    }
    if let Some(pid) = cli.pid {
        config.monitor.pid = Some(pid);
    }
    if let Some(cadence) = cli.cadence {
        config.monitor.cadence = cadence;
    }
    config.validate()?;

    tracing::info!(
        "Endpoint: {}, cadence: {:?}, window: {:?}, transports: {:?}",
        config.reporter.endpoint,
        config.monitor.cadence,
        config.monitor.window_span,
        config.monitor.transports,
    );

    let source = ProcNetDevSource::new(config.monitor.pid);
    tracing::info!("Reading usage from: {}", source.root().display());

    let sampler = UsageSampler::new(
        source,
        config.monitor.transports.clone(),
        config.monitor.window_span,
    )?
    .with_query_timeout(Some(config.monitor.query_timeout));
    let attributor = CallSiteAttributor::new(
        CallSiteRegistry::new(),
        config.monitor.tracked_packages.iter().cloned(),
    );

    let http = HttpReporter::new(&config.reporter.endpoint, config.reporter.request_timeout)?;
    let queue = Arc::new(QueuedReporter::spawn(http, config.reporter.queue_capacity));

    let scheduler = PollingScheduler::new(
        sampler,
        attributor,
        Arc::clone(&queue),
        config.scheduler_config(),
    );
    let handle = scheduler.spawn()?;

    tracing::info!("Press Ctrl+C to shutdown");
    shutdown_signal().await;

    let stopped = tokio::task::spawn_blocking(move || handle.stop()).await?;
    if stopped.is_err() {
        tracing::error!("Polling thread panicked");
    }

    // The scheduler released its clone when the poll thread exited.
    match Arc::try_unwrap(queue) {
        Ok(queue) => {
            let dropped = queue.dropped();
            queue.shutdown().await?;
            tracing::info!("Report queue flushed ({} batches dropped)", dropped);
        }
        Err(_) => tracing::warn!("Report queue still shared, skipping flush"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
