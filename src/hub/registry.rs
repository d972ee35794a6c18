use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::connection::{ClientKey, Connection, DeliveryStats, OutboundMessage, SendError};
use crate::metrics::{ConnectionMetrics, DeliveryMetrics, InboundMetrics};
use crate::transport::{Frame, Transport};

use super::reader;
use super::types::{
    BroadcastReport, ConnectionHandle, ConnectionStatsView, Envelope, HubConfig, HubEntry,
    HubError, HubStats, InboundEvent, RegisterError, RemovalReason, Target,
};

/// Fan-outs to more keys than this serialize the payload once up front
const PRESERIALIZATION_THRESHOLD: usize = 4;

/// Owns every live connection and routes outbound messages to them.
///
/// The registry map is the only state shared across connections. Its shard
/// locks are held for lookup and mutation only; entries are cloned out before
/// any transport I/O happens.
pub struct Hub {
    /// client key -> connection + stats
    entries: DashMap<ClientKey, HubEntry>,
    config: HubConfig,
    inbound: Option<mpsc::Sender<InboundEvent>>,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            inbound: None,
        }
    }

    /// Create a hub that forwards inbound application frames to `inbound`
    pub fn with_inbound(config: HubConfig, inbound: mpsc::Sender<InboundEvent>) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            inbound: Some(inbound),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Admit a new connection under `key` and start its inbound reader.
    ///
    /// Fails with [`HubError::DuplicateKey`] if `key` is taken. The transport
    /// comes back untouched inside the error.
    pub fn register<T: Transport>(
        self: &Arc<Self>,
        key: impl Into<ClientKey>,
        transport: T,
    ) -> Result<ConnectionHandle, RegisterError<T>> {
        let key = key.into();

        let entry = match self.entries.entry(key.clone()) {
            Entry::Occupied(_) => {
                ConnectionMetrics::record_duplicate_key();
                tracing::warn!(client_id = %key, "Connection rejected: client key already registered");
                return Err(RegisterError::new(HubError::DuplicateKey(key), transport));
            }
            Entry::Vacant(slot) => {
                let (sink, stream) = transport.split();
                let connection = Arc::new(Connection::new(
                    key.clone(),
                    sink,
                    stream,
                    self.config.write_timeout,
                ));
                let entry = HubEntry {
                    connection,
                    stats: Arc::new(DeliveryStats::new()),
                };
                slot.insert(entry.clone());
                entry
            }
        };

        ConnectionMetrics::record_registered();
        tracing::info!(
            connection_id = %entry.connection.id(),
            client_id = %key,
            "Connection registered"
        );

        let reader = tokio::spawn(reader::run(self.clone(), entry.connection.clone()));
        Ok(ConnectionHandle::new(key, entry, reader))
    }

    /// Remove `key` and close its connection. Missing keys are not an error.
    pub async fn unregister(&self, key: &ClientKey) -> bool {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                self.finish_removal(key, entry, RemovalReason::Unregistered)
                    .await;
                true
            }
            None => false,
        }
    }

    /// Remove `key` only if it still maps to connection `connection_id`.
    ///
    /// Used by the reader and heartbeat so a stale observer cannot evict a
    /// newer connection registered under the same key.
    pub(crate) async fn evict(
        &self,
        key: &ClientKey,
        connection_id: Uuid,
        reason: RemovalReason,
    ) -> bool {
        let removed = self
            .entries
            .remove_if(key, |_, entry| entry.connection.id() == connection_id);
        match removed {
            Some((_, entry)) => {
                self.finish_removal(key, entry, reason).await;
                true
            }
            None => false,
        }
    }

    /// Evict `key` if its connection has been silent for longer than
    /// `max_silence`, making room for a reconnecting client.
    pub async fn evict_stale(&self, key: &ClientKey, max_silence: Duration) -> bool {
        let Some(entry) = self.get(key) else {
            return false;
        };
        let silent_for = entry.connection.last_pong_at().await.elapsed();
        if silent_for <= max_silence {
            return false;
        }
        self.evict(key, entry.connection.id(), RemovalReason::Replaced)
            .await
    }

    async fn finish_removal(&self, key: &ClientKey, entry: HubEntry, reason: RemovalReason) {
        if let Err(e) = entry.connection.close().await {
            tracing::debug!(client_id = %key, error = %e, "Close handshake failed");
        }

        ConnectionMetrics::record_removed(reason.as_str());
        let lifetime = chrono::Utc::now().signed_duration_since(entry.connection.connected_at());
        ConnectionMetrics::observe_duration(lifetime.num_milliseconds().max(0) as f64 / 1000.0);

        tracing::info!(
            connection_id = %entry.connection.id(),
            client_id = %key,
            reason = reason.as_str(),
            total_sent = entry.stats.total_sent(),
            total_failed = entry.stats.total_failed(),
            "Connection unregistered"
        );
    }

    /// Send `message` to the connection registered under `key`.
    ///
    /// Failures are recorded in the connection's stats and returned; the
    /// connection is never unregistered here.
    pub async fn send_to(&self, key: &ClientKey, message: &OutboundMessage) -> Result<(), HubError> {
        let entry = self.lookup(key)?;
        let result = entry.connection.send(message).await;
        Self::account(key, &entry, result)
    }

    /// Record a ping on `key` and write a ping control frame through the send path
    pub async fn ping(&self, key: &ClientKey) -> Result<(), HubError> {
        let entry = self.lookup(key)?;
        entry.connection.record_ping_sent().await;
        let result = entry.connection.send_frame(Frame::Ping(Vec::new())).await;
        Self::account(key, &entry, result)
    }

    fn lookup(&self, key: &ClientKey) -> Result<HubEntry, HubError> {
        self.entries
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| HubError::NotFound(key.clone()))
    }

    fn account(
        key: &ClientKey,
        entry: &HubEntry,
        result: Result<(), SendError>,
    ) -> Result<(), HubError> {
        match result {
            Ok(()) => {
                entry.stats.record_sent();
                DeliveryMetrics::record_delivered();
                Ok(())
            }
            Err(e) => {
                if e.reached_transport() {
                    entry.stats.record_sent();
                }
                entry.stats.record_failure(e.to_string());
                DeliveryMetrics::record_failed(e.kind());
                tracing::debug!(
                    connection_id = %entry.connection.id(),
                    client_id = %key,
                    error = %e,
                    "Send failed"
                );
                Err(HubError::Send {
                    key: key.clone(),
                    source: e,
                })
            }
        }
    }

    /// Send `message` to every registered connection
    pub async fn broadcast(&self, message: &OutboundMessage) -> BroadcastReport {
        self.broadcast_where(message, |_| true).await
    }

    /// Send `message` to every registered key matching `predicate`.
    ///
    /// Best effort: individual failures are counted, never abort the fan-out.
    pub async fn broadcast_where<F>(&self, message: &OutboundMessage, predicate: F) -> BroadcastReport
    where
        F: Fn(&ClientKey) -> bool,
    {
        // Release the shard guards before running caller code
        let keys: Vec<ClientKey> = self
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let keys: Vec<ClientKey> = keys.into_iter().filter(|key| predicate(key)).collect();

        DeliveryMetrics::record_broadcast();
        self.fan_out(keys, message).await
    }

    /// Dispatch an envelope according to its target
    pub async fn publish(&self, envelope: &Envelope) -> BroadcastReport {
        match &envelope.target {
            Target::All => self.broadcast(&envelope.message).await,
            Target::Keys(keys) => self.fan_out(keys.clone(), &envelope.message).await,
        }
    }

    async fn fan_out(&self, keys: Vec<ClientKey>, message: &OutboundMessage) -> BroadcastReport {
        let mut report = BroadcastReport {
            targeted: keys.len(),
            ..Default::default()
        };
        if keys.is_empty() {
            return report;
        }

        let prepared;
        let message = if keys.len() >= PRESERIALIZATION_THRESHOLD {
            match message.preserialize() {
                Ok(serialized) => {
                    prepared = serialized;
                    &prepared
                }
                Err(_) => message,
            }
        } else {
            message
        };

        let mut results = stream::iter(keys)
            .map(|key| async move { self.send_to(&key, message).await })
            .buffer_unordered(self.config.max_concurrent_sends.max(1));

        while let Some(result) = results.next().await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(HubError::NotFound(_)) => report.missing += 1,
                Err(_) => report.failed += 1,
            }
        }

        tracing::debug!(
            targeted = report.targeted,
            delivered = report.delivered,
            failed = report.failed,
            missing = report.missing,
            "Fan-out completed"
        );
        report
    }

    /// Forward an application frame read from `key` to the inbound consumer
    pub(crate) fn forward_inbound(&self, key: &ClientKey, frame: Frame) {
        let Some(inbound) = &self.inbound else {
            tracing::debug!(client_id = %key, kind = frame.kind(), "No inbound consumer, frame dropped");
            return;
        };

        let event = InboundEvent {
            key: key.clone(),
            frame,
        };
        if let Err(e) = inbound.try_send(event) {
            InboundMetrics::record_dropped();
            tracing::warn!(client_id = %key, error = %e, "Inbound consumer unavailable, frame dropped");
        }
    }

    /// Per-connection diagnostic dump
    pub async fn snapshot_stats(&self) -> HashMap<ClientKey, ConnectionStatsView> {
        let entries = self.entries_snapshot();
        let mut views = HashMap::with_capacity(entries.len());
        for (key, entry) in entries {
            views.insert(key, Self::view(&entry).await);
        }
        views
    }

    /// Diagnostic view of a single connection
    pub async fn connection_stats(&self, key: &ClientKey) -> Option<ConnectionStatsView> {
        let entry = self.lookup(key).ok()?;
        Some(Self::view(&entry).await)
    }

    async fn view(entry: &HubEntry) -> ConnectionStatsView {
        let connection = &entry.connection;
        ConnectionStatsView {
            connection_id: connection.id(),
            connected: connection.is_connected().await,
            connected_at: connection.connected_at(),
            last_pong_age_ms: connection.last_pong_at().await.elapsed().as_millis() as u64,
            delivery: entry.stats.snapshot(),
        }
    }

    /// Aggregate counters across all connections
    pub fn summary(&self) -> HubStats {
        let mut stats = HubStats {
            total_connections: 0,
            total_sent: 0,
            total_failed: 0,
        };
        for entry in self.entries.iter() {
            stats.total_connections += 1;
            stats.total_sent += entry.stats.total_sent();
            stats.total_failed += entry.stats.total_failed();
        }
        stats
    }

    /// Registered keys with their connections, copied out of the map
    pub fn entries_snapshot(&self) -> Vec<(ClientKey, HubEntry)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn keys(&self) -> Vec<ClientKey> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn get(&self, key: &ClientKey) -> Option<HubEntry> {
        self.lookup(key).ok()
    }

    pub fn contains(&self, key: &ClientKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unregister and close every connection; returns how many were closed
    pub async fn close_all(&self) -> usize {
        let mut closed = 0;
        for (key, entry) in self.entries_snapshot() {
            if self
                .evict(&key, entry.connection.id(), RemovalReason::Shutdown)
                .await
            {
                closed += 1;
            }
        }
        closed
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}
