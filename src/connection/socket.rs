use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::time::{timeout, Instant};
use uuid::Uuid;

use crate::transport::{Frame, FrameSink, FrameStream, TransportError};

use super::{ClientKey, CloseError, OutboundMessage, RecvError, SendError};

/// Default bound on a single transport write
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

struct ConnectionState {
    connected: bool,
    sink: Option<Box<dyn FrameSink>>,
    last_ping_sent_at: Option<Instant>,
    last_pong_received_at: Instant,
}

/// One live duplex channel to a single client.
///
/// `connected`, the liveness timestamps and every outbound write share one
/// lock, so concurrent senders never interleave frames and a send cannot race
/// a close. The inbound half sits behind its own lock and is drained by a
/// single reader task.
pub struct Connection {
    id: Uuid,
    key: ClientKey,
    connected_at: DateTime<Utc>,
    write_timeout: Duration,
    state: Mutex<ConnectionState>,
    stream: Mutex<Box<dyn FrameStream>>,
    closed: watch::Sender<bool>,
}

impl Connection {
    pub fn new(
        key: ClientKey,
        sink: Box<dyn FrameSink>,
        stream: Box<dyn FrameStream>,
        write_timeout: Duration,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            key,
            connected_at: Utc::now(),
            write_timeout,
            state: Mutex::new(ConnectionState {
                connected: true,
                sink: Some(sink),
                last_ping_sent_at: None,
                last_pong_received_at: Instant::now(),
            }),
            stream: Mutex::new(stream),
            closed,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &ClientKey {
        &self.key
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Serialize and write `message` as one frame.
    ///
    /// A fatal write error closes the connection before returning.
    pub async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Err(SendError::AlreadyClosed);
        }
        let frame = message.to_frame()?;
        self.write_locked(&mut state, frame).await
    }

    /// Write a raw frame (control frames from the heartbeat and reader)
    pub async fn send_frame(&self, frame: Frame) -> Result<(), SendError> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Err(SendError::AlreadyClosed);
        }
        self.write_locked(&mut state, frame).await
    }

    /// Block until the next inbound frame arrives.
    ///
    /// Only one task should call this. Returns [`RecvError::Closed`] once the
    /// connection is closed, including when `close` runs while this is pending.
    pub async fn receive(&self) -> Result<Frame, RecvError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(RecvError::Closed);
        }

        let next = {
            let mut stream = self.stream.lock().await;
            tokio::select! {
                next = stream.next_frame() => next,
                _ = closed.changed() => return Err(RecvError::Closed),
            }
        };

        match next {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => {
                self.mark_closed().await;
                Err(RecvError::Transport(e))
            }
            None => {
                self.mark_closed().await;
                Err(RecvError::Closed)
            }
        }
    }

    /// Close the connection. Calling it again is a no-op that succeeds.
    pub async fn close(&self) -> Result<(), CloseError> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Ok(());
        }
        self.shutdown_locked(&mut state).await
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    pub async fn record_ping_sent(&self) {
        self.state.lock().await.last_ping_sent_at = Some(Instant::now());
    }

    pub async fn record_pong_received(&self) {
        self.state.lock().await.last_pong_received_at = Instant::now();
    }

    /// Last pong, or the admission time if none has arrived yet
    pub async fn last_pong_at(&self) -> Instant {
        self.state.lock().await.last_pong_received_at
    }

    pub async fn last_ping_at(&self) -> Option<Instant> {
        self.state.lock().await.last_ping_sent_at
    }

    async fn write_locked(
        &self,
        state: &mut ConnectionState,
        frame: Frame,
    ) -> Result<(), SendError> {
        let Some(sink) = state.sink.as_mut() else {
            return Err(SendError::AlreadyClosed);
        };

        let result = match timeout(self.write_timeout, sink.send_frame(frame)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.write_timeout)),
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if !e.is_fatal() => Err(SendError::Rejected(e)),
            Err(e) => {
                tracing::debug!(
                    connection_id = %self.id,
                    client_id = %self.key,
                    error = %e,
                    "Write failed, closing connection"
                );
                let _ = self.shutdown_locked(state).await;
                Err(SendError::Transport(e))
            }
        }
    }

    async fn mark_closed(&self) {
        let mut state = self.state.lock().await;
        if state.connected {
            let _ = self.shutdown_locked(&mut state).await;
        }
    }

    /// Flip to closed, release the sink and wake a pending `receive`
    async fn shutdown_locked(&self, state: &mut ConnectionState) -> Result<(), CloseError> {
        state.connected = false;
        self.closed.send_replace(true);

        let Some(mut sink) = state.sink.take() else {
            return Ok(());
        };
        match timeout(self.write_timeout, sink.close()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CloseError(e)),
            Err(_) => Err(CloseError(TransportError::Timeout(self.write_timeout))),
        }
    }
}
