//! Duplex frame transports.
//!
//! A transport is split into a [`FrameSink`] (outbound half, owned by the
//! connection's write lock) and a [`FrameStream`] (inbound half, drained by a
//! single reader task). Two implementations ship with the crate:
//! - [`websocket`]: axum WebSocket connections accepted by the `/ws` endpoint
//! - [`memory`]: an in-process channel pair used by tests and embedded clients

pub mod memory;
pub mod websocket;

use std::time::Duration;

use async_trait::async_trait;

/// A single discrete unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
            Frame::Ping(_) => "ping",
            Frame::Pong(_) => "pong",
            Frame::Close => "close",
        }
    }
}

/// Errors raised by a transport half
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("channel closed by peer")]
    Closed,

    #[error("outbound buffer full, frame refused")]
    Full,

    #[error("frame refused by peer: {0}")]
    Refused(String),

    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// A fatal error leaves the channel unusable. `Full` and `Refused` mean
    /// the frame was turned away before anything was written, so the channel
    /// is still intact.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Full | TransportError::Refused(_))
    }
}

/// Outbound half of a duplex channel
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Write one frame as a whole unit
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Send a close frame (best effort) and release the channel
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of a duplex channel
#[async_trait]
pub trait FrameStream: Send + 'static {
    /// Next inbound frame; `None` once the peer has gone away.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;
}

/// A duplex channel that can be split into its two halves
pub trait Transport: Send + 'static {
    fn split(self) -> (Box<dyn FrameSink>, Box<dyn FrameStream>);
}
