//! Health check and statistics endpoints.

use std::collections::HashMap;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::connection::ClientKey;
use crate::hub::{ConnectionStatsView, HubStats};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub summary: HubStats,
    pub connections: HashMap<ClientKey, ConnectionStatsView>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connections: state.hub.len(),
    })
}

/// GET /stats - per-connection delivery stats
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let connections = state.hub.snapshot_stats().await;
    Json(StatsResponse {
        summary: state.hub.summary(),
        connections,
    })
}
