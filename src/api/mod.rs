//! API layer - HTTP endpoint handlers.

mod connection;
mod events;
mod health;
mod metrics;
mod routes;

pub use connection::{get_connection, list_connections};
pub use events::{
    broadcast_event, send_event, BroadcastEventRequest, BroadcastEventResponse, SendEventRequest,
    SendEventResponse,
};
pub use health::{health, stats, HealthResponse, StatsResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
