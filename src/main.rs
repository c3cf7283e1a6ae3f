//! GamesmanStatus - endpoint liveness and latency monitoring.

use gamesman_status::config::ServerConfig;
use gamesman_status::db::Store;
use gamesman_status::directory::load_probes;
use gamesman_status::probe::HttpProber;
use gamesman_status::scheduler::{Heartbeat, Scheduler, TickRunner};
use gamesman_status::web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("gamesman_status=info".parse()?))
        .init();

    // Load configuration from .env and the environment
    let cfg = ServerConfig::load()?;
    tracing::info!("Starting GamesmanStatus on {}:{}...", cfg.host, cfg.http_port);

    // Probe directory is required, a bad file stops startup
    let probes = load_probes(&cfg.probes_path)?;
    if probes.is_empty() {
        tracing::warn!("No enabled probes in {}", cfg.probes_path);
    } else {
        tracing::info!("Loaded {} probes from {}", probes.len(), cfg.probes_path);
    }

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Using database at {} ({} samples)", cfg.db_path, store.count()?);

    let heartbeat = Arc::new(Heartbeat::new());
    let prober = Arc::new(HttpProber::new()?);
    let runner = TickRunner::new(
        probes,
        prober,
        store.clone(),
        heartbeat.clone(),
        cfg.probe_timeout(),
    );

    // Start scheduler
    let scheduler = Scheduler::new(cfg.probe_interval(), cfg.probe_jitter()).start(move || {
        let runner = runner.clone();
        async move {
            let report = runner.run_tick().await?;
            tracing::info!(
                "Tick finished: {}/{} probes ok, {} samples stored in {:?}",
                report.ok,
                report.probes,
                report.inserted,
                report.elapsed
            );
            Ok::<(), gamesman_status::scheduler::TickError>(())
        }
    });

    // Start web server, runs until SIGINT/SIGTERM
    let server = Server::new(cfg, store, heartbeat);
    server.start(shutdown_signal()).await?;

    // Let an in-flight tick finish before exiting
    scheduler.cancel();
    scheduler.join().await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
