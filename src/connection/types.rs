//! Connection identity and error types

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transport::TransportError;

/// Opaque client/session key a connection is registered under
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive a fresh random key for clients that do not supply one
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ClientKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for ClientKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Errors returned by [`Connection::send`](super::Connection::send)
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
    /// The connection was closed before this send
    #[error("connection already closed")]
    AlreadyClosed,

    /// The write failed; the connection has been closed
    #[error("transport failure: {0}")]
    Transport(TransportError),

    /// The transport refused the frame without writing it; the connection stays open
    #[error("frame rejected: {0}")]
    Rejected(TransportError),

    #[error("failed to serialize message: {0}")]
    Serialize(String),
}

impl SendError {
    /// Whether the attempt got as far as the transport
    pub fn reached_transport(&self) -> bool {
        matches!(self, SendError::Transport(_) | SendError::Rejected(_))
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SendError::AlreadyClosed => "already_closed",
            SendError::Transport(_) => "transport",
            SendError::Rejected(_) => "rejected",
            SendError::Serialize(_) => "serialize",
        }
    }
}

/// Errors returned by [`Connection::receive`](super::Connection::receive)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecvError {
    #[error("connection closed")]
    Closed,

    #[error("transport failure: {0}")]
    Transport(TransportError),
}

/// Error returned when the closing handshake could not be delivered.
/// The connection is closed regardless.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("close handshake failed: {0}")]
pub struct CloseError(pub TransportError);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_key_serializes_as_string() {
        let key = ClientKey::from("agent-42:browser");
        assert_eq!(serde_json::to_string(&key).unwrap(), r#""agent-42:browser""#);
        assert_eq!(key.to_string(), "agent-42:browser");
    }

    #[test]
    fn test_generated_keys_are_unique() {
        assert_ne!(ClientKey::generate(), ClientKey::generate());
    }

    #[test]
    fn test_send_error_classification() {
        assert!(!SendError::AlreadyClosed.reached_transport());
        assert!(!SendError::Serialize("bad".to_string()).reached_transport());
        assert!(SendError::Transport(TransportError::Closed).reached_transport());
        assert!(SendError::Rejected(TransportError::Full).reached_transport());
    }
}
