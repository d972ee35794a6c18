use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::connection::ClientKey;

/// Control messages the server writes to a client as JSON text frames
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "connected")]
    Connected {
        client_id: ClientKey,
        connection_id: Uuid,
        /// Seconds between server pings
        heartbeat_interval: u64,
    },
    #[serde(rename = "shutdown")]
    Shutdown {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reconnect_after_seconds: Option<u64>,
    },
    #[serde(rename = "error")]
    Error {
        code: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn shutdown(reason: impl Into<String>, reconnect_after_seconds: Option<u64>) -> Self {
        Self::Shutdown {
            reason: reason.into(),
            reconnect_after_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_wire_format() {
        let msg = ServerMessage::Connected {
            client_id: ClientKey::from("c1"),
            connection_id: Uuid::nil(),
            heartbeat_interval: 30,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["client_id"], "c1");
        assert_eq!(json["heartbeat_interval"], 30);
    }

    #[test]
    fn test_error_wire_format() {
        let json = serde_json::to_value(ServerMessage::error("DUPLICATE_CLIENT", "taken")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "DUPLICATE_CLIENT");
    }

    #[test]
    fn test_shutdown_omits_missing_delay() {
        let json = serde_json::to_value(ServerMessage::shutdown("restart", None)).unwrap();
        assert_eq!(json["type"], "shutdown");
        assert!(json.get("reconnect_after_seconds").is_none());
    }
}
