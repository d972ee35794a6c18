//! In-process duplex channel.
//!
//! [`pair`] returns the server half ([`MemoryTransport`], handed to the hub)
//! and the client half ([`MemoryPeer`]). The server's outbound writes can be
//! steered through [`FaultPlan`] to refuse, fail or stall frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Frame, FrameSink, FrameStream, Transport, TransportError};

/// Scripted failures for the server-side sink
#[derive(Debug, Default)]
pub struct FaultPlan {
    refuse_remaining: AtomicUsize,
    refusals: Mutex<VecDeque<String>>,
    fail_writes: AtomicBool,
    stall_writes: AtomicBool,
    close_calls: AtomicUsize,
}

impl FaultPlan {
    /// Refuse the next `count` frames with [`TransportError::Full`]
    pub fn refuse_next(&self, count: usize) {
        self.refuse_remaining.store(count, Ordering::SeqCst);
    }

    /// Refuse one upcoming frame with [`TransportError::Refused`] carrying `reason`.
    /// Queued refusals are used in order, before any [`refuse_next`](Self::refuse_next) count.
    pub fn refuse_with(&self, reason: impl Into<String>) {
        if let Ok(mut refusals) = self.refusals.lock() {
            refusals.push_back(reason.into());
        }
    }

    /// Fail every write with an I/O error
    pub fn fail_writes(&self, enabled: bool) {
        self.fail_writes.store(enabled, Ordering::SeqCst);
    }

    /// Never complete writes (exercises the write timeout)
    pub fn stall_writes(&self, enabled: bool) {
        self.stall_writes.store(enabled, Ordering::SeqCst);
    }

    /// Number of times the sink has been closed
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn take_refusal_reason(&self) -> Option<String> {
        self.refusals.lock().ok()?.pop_front()
    }

    fn take_refusal(&self) -> bool {
        self.refuse_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Create a connected server/client pair with `buffer` frames of capacity per direction
pub fn pair(buffer: usize) -> (MemoryTransport, MemoryPeer) {
    let (to_peer_tx, to_peer_rx) = mpsc::channel(buffer);
    let (to_server_tx, to_server_rx) = mpsc::channel(buffer);
    let faults = Arc::new(FaultPlan::default());

    let transport = MemoryTransport {
        outbound: to_peer_tx,
        inbound: to_server_rx,
        faults: faults.clone(),
    };
    let peer = MemoryPeer {
        outbound: Some(to_server_tx),
        inbound: to_peer_rx,
        faults,
    };
    (transport, peer)
}

/// Server half of an in-memory channel
pub struct MemoryTransport {
    outbound: mpsc::Sender<Frame>,
    inbound: mpsc::Receiver<Frame>,
    faults: Arc<FaultPlan>,
}

impl Transport for MemoryTransport {
    fn split(self) -> (Box<dyn FrameSink>, Box<dyn FrameStream>) {
        (
            Box::new(MemorySink {
                outbound: Some(self.outbound),
                faults: self.faults,
            }),
            Box::new(MemoryStream {
                inbound: self.inbound,
            }),
        )
    }
}

struct MemorySink {
    outbound: Option<mpsc::Sender<Frame>>,
    faults: Arc<FaultPlan>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.faults.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Io("injected write failure".to_string()));
        }
        if let Some(reason) = self.faults.take_refusal_reason() {
            return Err(TransportError::Refused(reason));
        }
        if self.faults.take_refusal() {
            return Err(TransportError::Full);
        }

        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Full,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.faults.close_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.try_send(Frame::Close);
        }
        Ok(())
    }
}

struct MemoryStream {
    inbound: mpsc::Receiver<Frame>,
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }
}

/// Client half of an in-memory channel
pub struct MemoryPeer {
    outbound: Option<mpsc::Sender<Frame>>,
    inbound: mpsc::Receiver<Frame>,
    faults: Arc<FaultPlan>,
}

impl MemoryPeer {
    /// Send a frame to the server
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        outbound
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Receive the next frame written by the server
    pub async fn recv(&mut self) -> Option<Frame> {
        self.inbound.recv().await
    }

    /// Non-blocking receive
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.inbound.try_recv().ok()
    }

    /// Stop sending; the server's reader observes end-of-stream
    pub fn hang_up(&mut self) {
        self.outbound = None;
    }

    /// Failure controls for the server's outbound half
    pub fn faults(&self) -> Arc<FaultPlan> {
        self.faults.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (transport, mut peer) = pair(4);
        let (mut sink, mut stream) = transport.split();

        sink.send_frame(Frame::Text("hello".to_string())).await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::Text("hello".to_string())));

        peer.send(Frame::Pong(vec![])).await.unwrap();
        assert_eq!(stream.next_frame().await, Some(Ok(Frame::Pong(vec![]))));
    }

    #[tokio::test]
    async fn test_refusals_are_counted_down() {
        let (transport, peer) = pair(4);
        let (mut sink, _stream) = transport.split();

        peer.faults().refuse_next(2);
        assert_eq!(sink.send_frame(Frame::Close).await, Err(TransportError::Full));
        assert_eq!(sink.send_frame(Frame::Close).await, Err(TransportError::Full));
        assert_eq!(sink.send_frame(Frame::Ping(vec![])).await, Ok(()));
    }

    #[tokio::test]
    async fn test_refusal_reasons_are_used_in_order() {
        let (transport, peer) = pair(4);
        let (mut sink, _stream) = transport.split();

        peer.faults().refuse_with("quota-1");
        peer.faults().refuse_with("quota-2");
        assert_eq!(
            sink.send_frame(Frame::Close).await,
            Err(TransportError::Refused("quota-1".to_string()))
        );
        assert_eq!(
            sink.send_frame(Frame::Close).await,
            Err(TransportError::Refused("quota-2".to_string()))
        );
        assert_eq!(sink.send_frame(Frame::Ping(vec![])).await, Ok(()));
    }

    #[tokio::test]
    async fn test_full_buffer_refuses() {
        let (transport, _peer) = pair(1);
        let (mut sink, _stream) = transport.split();

        assert_eq!(sink.send_frame(Frame::Ping(vec![])).await, Ok(()));
        assert_eq!(
            sink.send_frame(Frame::Ping(vec![])).await,
            Err(TransportError::Full)
        );
    }

    #[tokio::test]
    async fn test_close_releases_channel() {
        let (transport, mut peer) = pair(4);
        let (mut sink, _stream) = transport.split();

        sink.close().await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::Close));
        assert_eq!(peer.recv().await, None);
        assert_eq!(
            sink.send_frame(Frame::Text("late".to_string())).await,
            Err(TransportError::Closed)
        );
        assert_eq!(peer.faults().close_calls(), 1);
    }

    #[tokio::test]
    async fn test_hang_up_ends_stream() {
        let (transport, mut peer) = pair(4);
        let (_sink, mut stream) = transport.split();

        peer.hang_up();
        assert_eq!(stream.next_frame().await, None);
    }
}
