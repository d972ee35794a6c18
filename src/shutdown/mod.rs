//! Graceful shutdown of the hub.
//!
//! The sequence is:
//! 1. Tell every connected client the server is going away
//! 2. Signal background tasks (heartbeat, inbound consumer) to stop
//! 3. Unregister and close every remaining connection

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::connection::OutboundMessage;
use crate::hub::Hub;
use crate::websocket::ServerMessage;

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for clients to be notified (default: 5 seconds)
    pub client_notification_timeout: Duration,
    /// Time to wait for connections to be closed (default: 10 seconds)
    pub drain_timeout: Duration,
    /// Suggested reconnect delay to send to clients (default: 5 seconds)
    pub reconnect_after_seconds: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            client_notification_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(10),
            reconnect_after_seconds: 5,
        }
    }
}

pub struct GracefulShutdown {
    hub: Arc<Hub>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(hub: Arc<Hub>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(hub, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        hub: Arc<Hub>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            hub,
            shutdown_tx,
            config,
        }
    }

    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.hub.len())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Notifying clients");
        result.clients_notified = self.notify_clients(reason).await;

        tracing::info!("Phase 2: Signaling background tasks to stop");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Phase 3: Closing connections");
        match timeout(self.config.drain_timeout, self.hub.close_all()).await {
            Ok(closed) => {
                result.connections_closed = closed;
                result.success = true;
            }
            Err(_) => {
                tracing::warn!(
                    remaining_connections = self.hub.len(),
                    "Some connections did not close before the drain timeout"
                );
            }
        }

        result.duration = start.elapsed();

        tracing::info!(
            clients_notified = result.clients_notified,
            connections_closed = result.connections_closed,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    async fn notify_clients(&self, reason: &str) -> usize {
        if self.hub.is_empty() {
            return 0;
        }

        let notice = ServerMessage::shutdown(reason, Some(self.config.reconnect_after_seconds));
        let message = match OutboundMessage::json(&notice) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize shutdown notice");
                return 0;
            }
        };

        match timeout(
            self.config.client_notification_timeout,
            self.hub.broadcast(&message),
        )
        .await
        {
            Ok(report) => {
                tracing::info!(
                    notified = report.delivered,
                    failed = report.failed,
                    total = report.targeted,
                    "Shutdown notifications sent"
                );
                report.delivered
            }
            Err(_) => {
                tracing::warn!("Timeout sending shutdown notifications");
                0
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether every connection was closed within the drain timeout
    pub success: bool,
    pub clients_notified: usize,
    pub connections_closed: usize,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubConfig;
    use crate::transport::memory::pair;
    use crate::transport::Frame;

    #[tokio::test]
    async fn test_shutdown_no_connections() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let (tx, _) = broadcast::channel(1);
        let shutdown = GracefulShutdown::new(hub, tx);

        let result = shutdown.execute("test shutdown").await;

        assert!(result.success);
        assert_eq!(result.clients_notified, 0);
        assert_eq!(result.connections_closed, 0);
    }

    #[tokio::test]
    async fn test_shutdown_notifies_and_closes() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let (transport, mut peer) = pair(8);
        hub.register("c1", transport).unwrap();
        let (tx, mut rx) = broadcast::channel(1);

        let result = GracefulShutdown::new(hub.clone(), tx)
            .execute("deploy")
            .await;

        assert!(result.success);
        assert_eq!(result.clients_notified, 1);
        assert!(hub.is_empty());
        assert!(rx.try_recv().is_ok());

        match peer.recv().await {
            Some(Frame::Text(text)) => assert!(text.contains("\"shutdown\"")),
            other => panic!("expected shutdown notice, got {other:?}"),
        }
        assert_eq!(peer.recv().await, Some(Frame::Close));
    }

    #[test]
    fn test_shutdown_config_defaults() {
        let config = ShutdownConfig::default();
        assert_eq!(config.client_notification_timeout, Duration::from_secs(5));
        assert_eq!(config.drain_timeout, Duration::from_secs(10));
        assert_eq!(config.reconnect_after_seconds, 5);
    }
}
