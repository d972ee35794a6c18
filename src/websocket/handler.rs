use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::time::Duration;

use crate::connection::{ClientKey, OutboundMessage};
use crate::hub::ConnectionHandle;
use crate::server::AppState;
use crate::transport::websocket::WebSocketTransport;

use super::message::ServerMessage;

/// Longest accepted caller-supplied client id
const MAX_CLIENT_ID_LEN: usize = 128;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub client_id: Option<String>,
}

/// WebSocket upgrade handler
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query),
    fields(has_client_id = query.client_id.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let key = match query.client_id {
        Some(id) if is_valid_client_id(&id) => ClientKey::new(id),
        Some(id) => {
            tracing::warn!(client_id = %id, "Invalid client id");
            return (StatusCode::BAD_REQUEST, "Invalid client_id").into_response();
        }
        None => ClientKey::generate(),
    };

    tracing::info!(client_id = %key, "WebSocket upgrade requested");

    ws.max_message_size(state.settings.websocket.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, key))
}

/// Handle an established WebSocket connection
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state),
    fields(client_id = %key, otel.kind = "server")
)]
async fn handle_socket(socket: WebSocket, state: AppState, key: ClientKey) {
    let Some(handle) = admit(&state, &key, WebSocketTransport::new(socket)).await else {
        return;
    };

    let welcome = ServerMessage::Connected {
        client_id: key.clone(),
        connection_id: handle.connection_id(),
        heartbeat_interval: state.settings.websocket.heartbeat_interval,
    };
    match OutboundMessage::json(&welcome) {
        Ok(message) => {
            if let Err(e) = state.hub.send_to(&key, &message).await {
                tracing::debug!(client_id = %key, error = %e, "Failed to send connected message");
            }
        }
        Err(e) => tracing::error!(error = %e, "Failed to serialize connected message"),
    }

    tracing::info!(
        connection_id = %handle.connection_id(),
        "WebSocket connection established"
    );

    // The hub's reader owns the connection from here; wait for it to end
    handle.closed().await;

    tracing::info!("WebSocket connection closed");
}

/// Register the socket, replacing a stale connection under the same key.
///
/// A live holder of the key keeps it; the newcomer is told why and closed.
async fn admit(
    state: &AppState,
    key: &ClientKey,
    transport: WebSocketTransport,
) -> Option<ConnectionHandle> {
    let rejected = match state.hub.register(key.clone(), transport) {
        Ok(handle) => return Some(handle),
        Err(rejected) => rejected,
    };

    // A holder that missed a whole heartbeat is most likely a half-open socket
    // left behind by the same client reconnecting
    let max_silence = Duration::from_secs(state.settings.websocket.heartbeat_interval);
    let rejected = if state.hub.evict_stale(key, max_silence).await {
        tracing::info!(client_id = %key, "Replaced stale connection");
        match state.hub.register(key.clone(), rejected.into_transport()) {
            Ok(handle) => return Some(handle),
            Err(again) => again,
        }
    } else {
        rejected
    };

    reject(rejected.into_transport().into_inner(), key).await;
    None
}

async fn reject(mut socket: WebSocket, key: &ClientKey) {
    tracing::warn!(client_id = %key, "Connection rejected: client id already connected");
    let error_msg = ServerMessage::error(
        "DUPLICATE_CLIENT",
        format!("client_id '{}' is already connected", key),
    );
    if let Ok(json) = serde_json::to_string(&error_msg) {
        let _ = socket.send(Message::Text(json.into())).await;
    }
    let _ = socket.send(Message::Close(None)).await;
}

/// Validate a caller-supplied client id
pub fn is_valid_client_id(id: &str) -> bool {
    if id.is_empty() || id.len() > MAX_CLIENT_ID_LEN {
        return false;
    }

    // Only allow alphanumeric, dash, underscore, dot and colon
    id.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}
