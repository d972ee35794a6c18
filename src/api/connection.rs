//! Connection inspection endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::connection::ClientKey;
use crate::error::{AppError, Result};
use crate::hub::{ConnectionStatsView, HubError};
use crate::server::AppState;

/// GET /api/v1/connections - registered client ids
pub async fn list_connections(State(state): State<AppState>) -> Json<Vec<ClientKey>> {
    Json(state.hub.keys())
}

/// GET /api/v1/connections/{client_id} - delivery stats for one connection
pub async fn get_connection(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<Json<ConnectionStatsView>> {
    let key = ClientKey::new(client_id);
    state
        .hub
        .connection_stats(&key)
        .await
        .map(Json)
        .ok_or_else(|| AppError::from(HubError::NotFound(key)))
}
