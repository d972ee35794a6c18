use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::connection::{get_connection, list_connections};
use super::events::{broadcast_event, send_event};
use super::health::{health, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        // Producer endpoints
        .route("/events/send", post(send_event))
        .route("/events/broadcast", post(broadcast_event))
        // Connection inspection
        .route("/connections", get(list_connections))
        .route("/connections/{client_id}", get(get_connection))
        .route_layer(middleware::from_fn_with_state(state, api_key_auth));

    Router::new()
        // Health, stats & metrics
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .nest("/api/v1", protected)
}
