//! Per-connection inbound reader task

use std::sync::Arc;

use crate::connection::{Connection, RecvError};
use crate::metrics::InboundMetrics;
use crate::transport::Frame;

use super::types::RemovalReason;
use super::Hub;

/// Drain inbound frames until the connection ends, then remove it from the hub.
///
/// This task is the only caller of `receive` and `record_pong_received` for
/// its connection.
pub(super) async fn run(hub: Arc<Hub>, connection: Arc<Connection>) {
    let key = connection.key().clone();

    loop {
        match connection.receive().await {
            Ok(frame) => {
                InboundMetrics::record_frame(frame.kind());
                match frame {
                    Frame::Pong(_) => connection.record_pong_received().await,
                    // The peer is evidently alive; the WebSocket layer answers pings itself
                    Frame::Ping(_) => connection.record_pong_received().await,
                    Frame::Close => {
                        tracing::debug!(
                            connection_id = %connection.id(),
                            client_id = %key,
                            "Received close frame"
                        );
                        break;
                    }
                    frame => hub.forward_inbound(&key, frame),
                }
            }
            Err(RecvError::Closed) => break,
            Err(RecvError::Transport(e)) => {
                tracing::warn!(
                    connection_id = %connection.id(),
                    client_id = %key,
                    error = %e,
                    "Receive error"
                );
                break;
            }
        }
    }

    hub.evict(&key, connection.id(), RemovalReason::PeerClosed)
        .await;
}
