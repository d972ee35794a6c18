use std::sync::Arc;

use serde::Serialize;

use crate::transport::Frame;

use super::SendError;

/// Opaque outbound payload.
///
/// The hub never looks inside; it only decides how the payload is framed.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// JSON value, serialized when written to the connection
    Json(serde_json::Value),
    /// Pre-serialized text (for efficient multi-send scenarios)
    Text(Arc<str>),
    /// Binary payload
    Binary(Arc<[u8]>),
}

impl OutboundMessage {
    /// Build a JSON message from any serializable value
    pub fn json<T: Serialize>(value: &T) -> Result<Self, SendError> {
        serde_json::to_value(value)
            .map(OutboundMessage::Json)
            .map_err(|e| SendError::Serialize(e.to_string()))
    }

    pub fn text(text: impl Into<Arc<str>>) -> Self {
        OutboundMessage::Text(text.into())
    }

    pub fn binary(data: impl Into<Arc<[u8]>>) -> Self {
        OutboundMessage::Binary(data.into())
    }

    /// Serialize once so a fan-out does not repeat the work per connection
    pub fn preserialize(&self) -> Result<Self, SendError> {
        match self {
            OutboundMessage::Json(value) => serde_json::to_string(value)
                .map(|text| OutboundMessage::Text(text.into()))
                .map_err(|e| SendError::Serialize(e.to_string())),
            other => Ok(other.clone()),
        }
    }

    /// Frame the payload as a single wire unit
    pub fn to_frame(&self) -> Result<Frame, SendError> {
        match self {
            OutboundMessage::Json(value) => serde_json::to_string(value)
                .map(Frame::Text)
                .map_err(|e| SendError::Serialize(e.to_string())),
            OutboundMessage::Text(text) => Ok(Frame::Text(text.to_string())),
            OutboundMessage::Binary(data) => Ok(Frame::Binary(data.to_vec())),
        }
    }
}

impl From<serde_json::Value> for OutboundMessage {
    fn from(value: serde_json::Value) -> Self {
        OutboundMessage::Json(value)
    }
}
