use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};

use livewire_hub::config::Settings;
use livewire_hub::hub::{Hub, InboundEvent};
use livewire_hub::server::{create_app, AppState};
use livewire_hub::shutdown::GracefulShutdown;
use livewire_hub::tasks::{HeartbeatConfig, HeartbeatTask};
use livewire_hub::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new().context("failed to load configuration")?;

    // Keep the guard alive until exit so buffered spans are flushed
    let _telemetry = init_telemetry(&settings.otel, &settings.log)?;
    tracing::info!("Configuration loaded");

    let heartbeat_config = HeartbeatConfig::try_from(&settings.websocket)
        .context("invalid heartbeat configuration")?;

    // Hub with an inbound consumer for application frames
    let (inbound_tx, inbound_rx) = mpsc::channel(settings.websocket.inbound_buffer.max(1));
    let hub = Arc::new(Hub::with_inbound(settings.websocket.hub_config(), inbound_tx));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let inbound_handle = tokio::spawn(consume_inbound(inbound_rx, shutdown_tx.subscribe()));

    // Start heartbeat task in background
    let heartbeat_task = HeartbeatTask::new(heartbeat_config, hub.clone(), shutdown_tx.subscribe());
    let heartbeat_handle = tokio::spawn(heartbeat_task.run());

    let state = AppState::new(settings.clone(), hub.clone());
    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let result = GracefulShutdown::new(hub, shutdown_tx)
        .execute("server shutting down")
        .await;
    if !result.success {
        tracing::warn!("Graceful shutdown did not close every connection");
    }

    tracing::info!("Waiting for background tasks to finish...");
    let _ = tokio::join!(inbound_handle, heartbeat_handle);

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Log application frames sent by clients
async fn consume_inbound(
    mut inbound: mpsc::Receiver<InboundEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            event = inbound.recv() => match event {
                Some(event) => tracing::debug!(
                    client_id = %event.key,
                    kind = event.frame.kind(),
                    "Inbound frame"
                ),
                None => break,
            },
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
