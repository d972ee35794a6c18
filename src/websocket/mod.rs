//! Client admission over WebSocket

mod handler;
mod message;

pub use handler::{is_valid_client_id, ws_handler, WsQuery};
pub use message::ServerMessage;
