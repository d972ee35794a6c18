//! Hub entry, routing and reporting types

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::connection::{
    ClientKey, Connection, DeliveryStats, DeliveryStatsSnapshot, OutboundMessage, SendError,
    DEFAULT_WRITE_TIMEOUT,
};
use crate::transport::Frame;

/// Errors returned by hub operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum HubError {
    #[error("client key '{0}' is already registered")]
    DuplicateKey(ClientKey),

    #[error("no connection registered for client key '{0}'")]
    NotFound(ClientKey),

    #[error("send to '{key}' failed: {source}")]
    Send {
        key: ClientKey,
        #[source]
        source: SendError,
    },
}

/// A rejected registration. The transport was never split or touched, so the
/// caller can close it, report the error on it, or retry after eviction.
#[derive(thiserror::Error)]
#[error("{error}")]
pub struct RegisterError<T> {
    #[source]
    pub error: HubError,
    transport: T,
}

impl<T> RegisterError<T> {
    pub(super) fn new(error: HubError, transport: T) -> Self {
        Self { error, transport }
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self.error, HubError::DuplicateKey(_))
    }

    /// Take back the transport that was offered to `register`
    pub fn into_transport(self) -> T {
        self.transport
    }
}

impl<T> std::fmt::Debug for RegisterError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<T> From<RegisterError<T>> for HubError {
    fn from(err: RegisterError<T>) -> Self {
        err.error
    }
}

/// Hub construction settings
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Bound on a single transport write
    pub write_timeout: Duration,
    /// Maximum concurrent sends during a fan-out
    pub max_concurrent_sends: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_concurrent_sends: 100,
        }
    }
}

/// A registry entry: the connection and its delivery stats
#[derive(Clone)]
pub struct HubEntry {
    pub connection: Arc<Connection>,
    pub stats: Arc<DeliveryStats>,
}

/// Returned by [`Hub::register`](super::Hub::register)
pub struct ConnectionHandle {
    pub key: ClientKey,
    pub connection: Arc<Connection>,
    pub stats: Arc<DeliveryStats>,
    reader: JoinHandle<()>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("key", &self.key)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    pub(super) fn new(key: ClientKey, entry: HubEntry, reader: JoinHandle<()>) -> Self {
        Self {
            key,
            connection: entry.connection,
            stats: entry.stats,
            reader,
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection.id()
    }

    /// Wait until the inbound reader has finished, i.e. the connection is gone
    pub async fn closed(self) {
        if let Err(e) = self.reader.await {
            tracing::warn!(client_id = %self.key, error = %e, "Inbound reader task failed");
        }
    }
}

/// Routing hint for an outbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "keys", rename_all = "snake_case")]
pub enum Target {
    /// Every registered connection
    All,
    /// A specific set of client keys
    Keys(Vec<ClientKey>),
}

/// An outbound payload together with where it should go
#[derive(Debug, Clone)]
pub struct Envelope {
    pub target: Target,
    pub message: OutboundMessage,
}

impl Envelope {
    pub fn broadcast(message: impl Into<OutboundMessage>) -> Self {
        Self {
            target: Target::All,
            message: message.into(),
        }
    }

    pub fn to_keys(keys: Vec<ClientKey>, message: impl Into<OutboundMessage>) -> Self {
        Self {
            target: Target::Keys(keys),
            message: message.into(),
        }
    }
}

/// Outcome of a fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Keys the message was addressed to
    pub targeted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Keys that were no longer registered at send time
    pub missing: usize,
}

/// An application frame read from a client
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub key: ClientKey,
    pub frame: Frame,
}

/// Why a connection left the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Explicit `unregister`
    Unregistered,
    /// Peer sent a close frame, hung up, or the channel failed
    PeerClosed,
    /// No pong within the liveness window
    HeartbeatTimeout,
    /// A silent connection made way for a reconnect under the same key
    Replaced,
    Shutdown,
}

impl RemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalReason::Unregistered => "unregistered",
            RemovalReason::PeerClosed => "peer_closed",
            RemovalReason::HeartbeatTimeout => "heartbeat_timeout",
            RemovalReason::Replaced => "replaced",
            RemovalReason::Shutdown => "shutdown",
        }
    }
}

/// Diagnostic view of one registered connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatsView {
    pub connection_id: Uuid,
    pub connected: bool,
    pub connected_at: DateTime<Utc>,
    /// Milliseconds since the last pong (or since admission)
    pub last_pong_age_ms: u64,
    #[serde(flatten)]
    pub delivery: DeliveryStatsSnapshot,
}

/// Aggregate hub statistics
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub total_connections: usize,
    pub total_sent: u64,
    pub total_failed: u64,
}
