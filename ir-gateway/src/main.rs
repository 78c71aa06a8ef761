//! irgate: HTTP-triggered IR remote transmitter
//!
//! Usage: `irgate [settings.json]`. Without an argument the settings are
//! read from `$XDG_CONFIG_HOME/irgate/settings.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use ir_gateway::{AppState, ButtonTable, DeviceKind, Settings};
use ir_sim::VirtualPulseDevice;
use ir_tx::{PigpioDevice, PulseDevice, TransmitWorker, WorkerConfig};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let loaded = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => Settings::load_from(&path),
        None => Settings::load(),
    };
    let (settings, load_error) = match loaded {
        Ok(settings) => (settings, None),
        Err(e) => (Settings::default(), Some(e)),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting irgate");
    if let Some(e) = load_error {
        tracing::warn!("{}, using default settings", e);
    }

    let config = settings
        .worker_config()
        .context("Invalid carrier settings")?;
    let buttons = ButtonTable::new(settings.buttons.clone());
    tracing::info!(
        "{} buttons: {}",
        buttons.len(),
        buttons.names().collect::<Vec<_>>().join(", ")
    );

    let listener = TcpListener::bind(settings.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr()))?;
    tracing::info!("Server started http://{}", settings.bind_addr());

    match settings.device.kind {
        DeviceKind::Pigpio => {
            let device = PigpioDevice::new(&settings.device.host, settings.device.port);
            run(device, config, buttons, listener).await
        }
        DeviceKind::Simulated => {
            tracing::warn!("Using simulated pulse generator, nothing will be transmitted");
            run(VirtualPulseDevice::new("irgate-sim"), config, buttons, listener).await
        }
    }
}

/// Serve requests with a worker on `device` until ctrl-c
async fn run<D: PulseDevice + 'static>(
    device: D,
    config: WorkerConfig,
    buttons: ButtonTable,
    listener: TcpListener,
) -> Result<()> {
    let (worker, queue) = TransmitWorker::new(device, config);
    let worker = worker.spawn();

    let state = AppState { buttons, queue };
    let served = ir_gateway::serve(listener, state, shutdown_signal()).await;

    tracing::info!("Server stopped");
    worker.stop().await.context("Transmit worker panicked")?;
    served.context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
