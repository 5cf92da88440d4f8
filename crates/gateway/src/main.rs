//! Gateway service entry point.
//!
//! Telemetry generator plus HTTP/SSE server for live dashboards.

use anyhow::Result;
use gateway::{AppState, ClientRegistry, GatewayConfig, Generator, SnapshotStore};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Gateway service");

    let config = GatewayConfig::from_env()?;
    info!("Configuration:");
    info!("  HTTP: {}", config.http_addr());
    info!("  METRICS_PORT: {}", config.metrics_port);
    info!("  TICK_INTERVAL: {:?}", config.tick_interval);
    info!("  SERIES_RETENTION: {}", config.series_retention);

    // Start Prometheus metrics server
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .install()?;
    info!("Prometheus metrics server started on port {}", config.metrics_port);

    // State resets to the seed on every restart
    let store = Arc::new(SnapshotStore::new(normalizer::build_demo()));
    let registry = Arc::new(ClientRegistry::new());

    // Spawn generator task
    let (generator_shutdown_tx, generator_shutdown_rx) = mpsc::channel(1);
    let generator = Generator::new(config.series_retention);
    let generator_handle = tokio::spawn(generator.run(
        store.clone(),
        registry.clone(),
        config.tick_interval,
        generator_shutdown_rx,
    ));

    let state = Arc::new(AppState { store, registry });

    let listener = TcpListener::bind(config.http_addr()).await?;
    info!("Gateway listening on {}", config.http_addr());
    info!("Available endpoints:");
    info!("  GET {}  - Current snapshot", gateway::SNAPSHOT_PATH);
    info!("  GET {}    - Live event stream", gateway::STREAM_PATH);
    info!("  GET /health                  - Health check");

    // Run server with graceful shutdown; the generator stops before streams are closed
    gateway::serve(listener, state, shutdown_signal(generator_shutdown_tx)).await?;

    match generator_handle.await {
        Ok(Err(e)) => error!("Generator error: {:?}", e),
        Err(e) => error!("Generator task failed: {:?}", e),
        Ok(Ok(())) => {}
    }

    info!("Gateway stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then stop the generator.
async fn shutdown_signal(generator_shutdown_tx: mpsc::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }

    info!("Shutting down generator...");
    let _ = generator_shutdown_tx.send(()).await;
}
