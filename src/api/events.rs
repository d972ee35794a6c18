//! Producer endpoints: push events to connected clients.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connection::{ClientKey, OutboundMessage};
use crate::error::{AppError, Result};
use crate::hub::{BroadcastReport, Envelope, HubError};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct SendEventRequest {
    pub client_id: ClientKey,
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SendEventResponse {
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastEventRequest {
    pub payload: serde_json::Value,
    /// Restrict delivery to these client ids
    #[serde(default)]
    pub client_ids: Option<Vec<ClientKey>>,
    /// Restrict delivery to client ids starting with this prefix
    #[serde(default)]
    pub key_prefix: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BroadcastEventResponse {
    #[serde(flatten)]
    pub report: BroadcastReport,
    pub timestamp: DateTime<Utc>,
}

/// Send an event to one connected client
#[tracing::instrument(
    name = "http.send_event",
    skip(state, request),
    fields(client_id = %request.client_id)
)]
pub async fn send_event(
    State(state): State<AppState>,
    Json(request): Json<SendEventRequest>,
) -> Result<Json<SendEventResponse>> {
    let message = OutboundMessage::from(request.payload);

    let error = match state.hub.send_to(&request.client_id, &message).await {
        Ok(()) => None,
        Err(e @ HubError::Send { .. }) => Some(e.to_string()),
        Err(e) => return Err(AppError::from(e)),
    };

    Ok(Json(SendEventResponse {
        delivered: error.is_none(),
        error,
        timestamp: Utc::now(),
    }))
}

/// Broadcast an event to all clients, a list of clients, or a key prefix
#[tracing::instrument(
    name = "http.broadcast_event",
    skip(state, request),
    fields(
        client_count = request.client_ids.as_ref().map(Vec::len),
        key_prefix = ?request.key_prefix
    )
)]
pub async fn broadcast_event(
    State(state): State<AppState>,
    Json(request): Json<BroadcastEventRequest>,
) -> Result<Json<BroadcastEventResponse>> {
    let message = OutboundMessage::from(request.payload);

    let report = match (request.client_ids, request.key_prefix) {
        (Some(_), Some(_)) => {
            return Err(AppError::Validation(
                "client_ids and key_prefix are mutually exclusive".to_string(),
            ))
        }
        (Some(client_ids), None) => {
            state
                .hub
                .publish(&Envelope::to_keys(client_ids, message))
                .await
        }
        (None, Some(prefix)) => {
            state
                .hub
                .broadcast_where(&message, |key| key.as_str().starts_with(&prefix))
                .await
        }
        (None, None) => state.hub.publish(&Envelope::broadcast(message)).await,
    };

    Ok(Json(BroadcastEventResponse {
        report,
        timestamp: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_request_defaults() {
        let request: BroadcastEventRequest =
            serde_json::from_str(r#"{"payload":{"kind":"refresh"}}"#).unwrap();
        assert!(request.client_ids.is_none());
        assert!(request.key_prefix.is_none());
    }

    #[tokio::test]
    async fn test_untargeted_broadcast_reaches_everyone() {
        use crate::config::Settings;
        use crate::hub::{Hub, HubConfig};
        use crate::transport::memory::pair;
        use std::sync::Arc;

        let hub = Arc::new(Hub::new(HubConfig::default()));
        let mut peers = Vec::new();
        for key in ["c1", "c2"] {
            let (transport, peer) = pair(4);
            hub.register(key, transport).unwrap();
            peers.push(peer);
        }
        let state = AppState::new(Settings::default(), hub);
        let request: BroadcastEventRequest =
            serde_json::from_str(r#"{"payload":{"kind":"refresh"}}"#).unwrap();

        let Json(response) = broadcast_event(State(state), Json(request)).await.unwrap();

        assert_eq!(response.report.targeted, 2);
        assert_eq!(response.report.delivered, 2);
        for peer in &mut peers {
            assert!(peer.try_recv().is_some());
        }
    }

    #[test]
    fn test_send_request_parses_client_id() {
        let request: SendEventRequest =
            serde_json::from_str(r#"{"client_id":"c1","payload":1}"#).unwrap();
        assert_eq!(request.client_id, ClientKey::from("c1"));
    }
}
