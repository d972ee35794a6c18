//! axum WebSocket adapter

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use super::{Frame, FrameSink, FrameStream, Transport, TransportError};

/// An upgraded WebSocket wrapped as a [`Transport`]
pub struct WebSocketTransport {
    socket: WebSocket,
}

impl WebSocketTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }

    /// Recover the socket, e.g. to report a rejected registration on it
    pub fn into_inner(self) -> WebSocket {
        self.socket
    }
}

impl From<WebSocket> for WebSocketTransport {
    fn from(socket: WebSocket) -> Self {
        Self::new(socket)
    }
}

impl Transport for WebSocketTransport {
    fn split(self) -> (Box<dyn FrameSink>, Box<dyn FrameStream>) {
        let (sender, receiver) = self.socket.split();
        (
            Box::new(WebSocketSink { inner: sender }),
            Box::new(WebSocketStream { inner: receiver }),
        )
    }
}

struct WebSocketSink {
    inner: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.inner
            .send(into_message(frame))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

struct WebSocketStream {
    inner: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameStream for WebSocketStream {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        let next = self.inner.next().await?;
        Some(
            next.map(from_message)
                .map_err(|e| TransportError::Io(e.to_string())),
        )
    }
}

fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data.into()),
        Frame::Ping(payload) => Message::Ping(payload.into()),
        Frame::Pong(payload) => Message::Pong(payload.into()),
        Frame::Close => Message::Close(None),
    }
}

fn from_message(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(data) => Frame::Binary(data.to_vec()),
        Message::Ping(payload) => Frame::Ping(payload.to_vec()),
        Message::Pong(payload) => Frame::Pong(payload.to_vec()),
        Message::Close(_) => Frame::Close,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_message_mapping() {
        let text = Frame::Text(r#"{"type":"build.status"}"#.to_string());
        assert_eq!(from_message(into_message(text.clone())), text);

        let binary = Frame::Binary(vec![0xde, 0xad]);
        assert_eq!(from_message(into_message(binary.clone())), binary);

        assert_eq!(from_message(into_message(Frame::Ping(vec![1]))), Frame::Ping(vec![1]));
        assert_eq!(from_message(into_message(Frame::Pong(vec![]))), Frame::Pong(vec![]));
        assert_eq!(from_message(into_message(Frame::Close)), Frame::Close);
    }
}
