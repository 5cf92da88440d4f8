//! Dashboard client entry point.
//!
//! Paints from the snapshot endpoint, then follows the live stream. On unix,
//! SIGUSR1 hides the view, SIGUSR2 shows it again, and SIGHUP reloads the
//! controls from the environment and `.env`.

use anyhow::Result;
use dashboard::{ChartSlot, Dashboard, DashboardConfig, LogChartBackend, RenderSync};
use std::sync::Arc;
use subscriber::{fetch_or_demo, ControlCommand, SseManager};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
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

    info!("Starting dashboard");

    let config = DashboardConfig::from_env()?;
    info!("Configuration:");
    info!("  GATEWAY: {}", config.subscriber.base_url);
    info!("  PRICE_PER_UNIT: {}", config.controls.price);
    info!("  DEVICE_COUNT: {}", config.controls.device_count);
    info!("  PER_UNIT_KWH: {}", config.controls.per_unit_rate);
    info!("  COMPARE_MODE: {}", config.controls.compare_mode);

    // First paint: snapshot endpoint, or demo data
    let client = reqwest::Client::new();
    let initial = fetch_or_demo(&client, config.subscriber.snapshot_url()?).await;

    let render = RenderSync::new(Arc::new(LogChartBackend), ChartSlot::ALL);
    let dashboard = Arc::new(Dashboard::new(initial, config.controls, render));
    let view = dashboard.view();
    info!(
        "Badge: {} | projected savings {:.0}/yr",
        view.badge.label, view.projected_savings
    );

    // Spawn subscriber task
    let (command_tx, command_rx) = mpsc::channel(8);
    let manager = SseManager::new(dashboard.clone(), config.subscriber, command_rx)?;
    let manager_handle = tokio::spawn(manager.run());

    #[cfg(unix)]
    tokio::spawn(forward_visibility_signals(command_tx.clone()));
    #[cfg(unix)]
    tokio::spawn(reload_controls_on_hangup(dashboard.clone()));

    shutdown_signal().await;

    info!("Shutting down subscriber...");
    let _ = command_tx.send(ControlCommand::Shutdown).await;
    match manager_handle.await {
        Ok(Err(e)) => error!("Subscriber error: {:?}", e),
        Err(e) => error!("Subscriber task failed: {:?}", e),
        Ok(Ok(())) => {}
    }

    info!("Dashboard stopped");
    Ok(())
}

#[cfg(unix)]
async fn forward_visibility_signals(command_tx: mpsc::Sender<ControlCommand>) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut hide, mut show) = match (
        signal(SignalKind::user_defined1()),
        signal(SignalKind::user_defined2()),
    ) {
        (Ok(hide), Ok(show)) => (hide, show),
        _ => {
            error!("Failed to install visibility signal handlers");
            return;
        }
    };

    loop {
        let command = tokio::select! {
            _ = hide.recv() => ControlCommand::Hidden,
            _ = show.recv() => ControlCommand::Visible,
        };
        info!("Visibility: {:?}", command);
        if command_tx.send(command).await.is_err() {
            break;
        }
    }
}

#[cfg(unix)]
async fn reload_controls_on_hangup(dashboard: Arc<Dashboard>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            error!("Failed to install reload signal handler: {}", e);
            return;
        }
    };

    while hangup.recv().await.is_some() {
        dotenvy::dotenv_override().ok();
        match DashboardConfig::from_env() {
            Ok(config) => {
                dashboard.set_controls(config.controls);
                let view = dashboard.view();
                info!(
                    "Controls reloaded: {} | projected savings {:.0}/yr",
                    view.badge.label, view.projected_savings
                );
            }
            Err(e) => warn!("Keeping current controls, reload failed: {}", e),
        }
    }
}

async fn shutdown_signal() {
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
}
