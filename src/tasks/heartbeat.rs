use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::connection::ClientKey;
use crate::hub::{Hub, RemovalReason};
use crate::metrics::{HeartbeatMetrics, MemoryMetrics};

/// Maximum concurrent pings to avoid overwhelming the system
const MAX_CONCURRENT_HEARTBEATS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeartbeatConfigError {
    #[error("heartbeat interval must be greater than zero")]
    ZeroInterval,

    #[error("liveness window {window:?} must exceed heartbeat interval {interval:?}")]
    WindowTooShort { interval: Duration, window: Duration },
}

/// Ping period `interval` and eviction threshold `liveness_window`
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    interval: Duration,
    liveness_window: Duration,
}

impl HeartbeatConfig {
    pub fn new(interval: Duration, liveness_window: Duration) -> Result<Self, HeartbeatConfigError> {
        if interval.is_zero() {
            return Err(HeartbeatConfigError::ZeroInterval);
        }
        if liveness_window <= interval {
            return Err(HeartbeatConfigError::WindowTooShort {
                interval,
                window: liveness_window,
            });
        }
        Ok(Self {
            interval,
            liveness_window,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn liveness_window(&self) -> Duration {
        self.liveness_window
    }
}

impl TryFrom<&WebSocketConfig> for HeartbeatConfig {
    type Error = HeartbeatConfigError;

    fn try_from(config: &WebSocketConfig) -> Result<Self, Self::Error> {
        Self::new(
            Duration::from_secs(config.heartbeat_interval),
            Duration::from_secs(config.liveness_window),
        )
    }
}

/// Outcome of one supervision round
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatRound {
    pub pinged: usize,
    pub failed: usize,
    pub evicted: usize,
}

/// Background task that pings every connection and evicts silent ones
pub struct HeartbeatTask {
    config: HeartbeatConfig,
    hub: Arc<Hub>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(config: HeartbeatConfig, hub: Arc<Hub>, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            config,
            hub,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.config.interval);

        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            heartbeat_interval_ms = self.config.interval.as_millis() as u64,
            liveness_window_ms = self.config.liveness_window.as_millis() as u64,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Evict connections silent for longer than the liveness window, then ping the rest
    pub async fn tick(&self) -> HeartbeatRound {
        let entries = self.hub.entries_snapshot();
        let mut round = HeartbeatRound::default();
        if entries.is_empty() {
            return round;
        }

        let start = Instant::now();
        let mut live: Vec<ClientKey> = Vec::with_capacity(entries.len());

        for (key, entry) in entries {
            let silent_for = entry.connection.last_pong_at().await.elapsed();
            if silent_for > self.config.liveness_window {
                let evicted = self
                    .hub
                    .evict(&key, entry.connection.id(), RemovalReason::HeartbeatTimeout)
                    .await;
                if evicted {
                    round.evicted += 1;
                    tracing::info!(
                        connection_id = %entry.connection.id(),
                        client_id = %key,
                        silent_ms = silent_for.as_millis() as u64,
                        "Evicted connection after heartbeat timeout"
                    );
                }
            } else {
                live.push(key);
            }
        }

        // Each ping is bounded by the connection's write timeout
        for batch in live.chunks(MAX_CONCURRENT_HEARTBEATS) {
            let results = join_all(batch.iter().map(|key| self.hub.ping(key))).await;
            for (key, result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => round.pinged += 1,
                    Err(e) => {
                        round.failed += 1;
                        tracing::debug!(client_id = %key, error = %e, "Heartbeat ping failed");
                    }
                }
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        HeartbeatMetrics::record_duration_ms(elapsed_ms);
        HeartbeatMetrics::record_pings(round.pinged as u64, round.failed as u64);
        if round.evicted > 0 {
            HeartbeatMetrics::record_evictions(round.evicted as u64);
        }
        MemoryMetrics::update_process_memory();

        tracing::debug!(
            pinged = round.pinged,
            failed = round.failed,
            evicted = round.evicted,
            elapsed_ms = elapsed_ms,
            "Heartbeat round completed"
        );

        let interval_ms = self.config.interval.as_millis() as u64;
        if elapsed_ms > interval_ms / 2 {
            tracing::warn!(
                elapsed_ms = elapsed_ms,
                heartbeat_interval_ms = interval_ms,
                connections = round.pinged + round.failed + round.evicted,
                "Heartbeat round took more than 50% of interval"
            );
        }

        round
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubConfig;
    use crate::transport::memory::pair;
    use crate::transport::Frame;

    fn config(interval_ms: u64, window_ms: u64) -> HeartbeatConfig {
        HeartbeatConfig::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(window_ms),
        )
        .unwrap()
    }

    #[test]
    fn test_config_requires_window_longer_than_interval() {
        let err = HeartbeatConfig::new(Duration::from_secs(30), Duration::from_secs(30)).unwrap_err();
        assert!(matches!(err, HeartbeatConfigError::WindowTooShort { .. }));

        let err = HeartbeatConfig::new(Duration::ZERO, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err, HeartbeatConfigError::ZeroInterval);

        let ok = HeartbeatConfig::try_from(&WebSocketConfig::default()).unwrap();
        assert!(ok.liveness_window() > ok.interval());
    }

    #[tokio::test]
    async fn test_heartbeat_task_shutdown() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = HeartbeatTask::new(config(1000, 3000), hub, shutdown_rx);
        let handle = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_tick_pings_live_connections() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (transport, mut peer) = pair(8);
        let handle = hub.register("c1", transport).unwrap();

        let task = HeartbeatTask::new(config(1000, 3000), hub.clone(), shutdown_rx);
        let round = task.tick().await;

        assert_eq!(round, HeartbeatRound { pinged: 1, failed: 0, evicted: 0 });
        assert!(matches!(peer.recv().await, Some(Frame::Ping(_))));
        assert!(handle.connection.last_ping_at().await.is_some());
        assert_eq!(handle.stats.total_sent(), 1);
    }

    #[tokio::test]
    async fn test_tick_evicts_silent_connection() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (transport, _peer) = pair(8);
        hub.register("c1", transport).unwrap();

        let task = HeartbeatTask::new(config(50, 100), hub.clone(), shutdown_rx);
        tokio::time::sleep(Duration::from_millis(150)).await;
        let round = task.tick().await;

        assert_eq!(round.evicted, 1);
        assert!(!hub.contains(&ClientKey::from("c1")));
    }

    #[tokio::test]
    async fn test_refused_ping_counts_as_failed() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (transport, peer) = pair(8);
        hub.register("c1", transport).unwrap();
        peer.faults().refuse_next(1);

        let task = HeartbeatTask::new(config(1000, 3000), hub.clone(), shutdown_rx);
        let round = task.tick().await;

        assert_eq!(round.failed, 1);
        assert!(hub.contains(&ClientKey::from("c1")));
    }
}
