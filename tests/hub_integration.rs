//! End-to-end delivery behavior through the hub over in-memory transports

use std::sync::Arc;
use std::time::Duration;

use livewire_hub::connection::{ClientKey, OutboundMessage, SendError};
use livewire_hub::hub::{ConnectionHandle, Envelope, Hub, HubConfig, HubError};
use livewire_hub::transport::memory::{pair, MemoryPeer};
use livewire_hub::transport::{Frame, TransportError};
use serde_json::json;
use tokio_test::assert_ok;

fn hub() -> Arc<Hub> {
    Arc::new(Hub::new(HubConfig {
        write_timeout: Duration::from_millis(200),
        max_concurrent_sends: 8,
    }))
}

fn connect(hub: &Arc<Hub>, key: &str) -> (ConnectionHandle, MemoryPeer) {
    let (transport, peer) = pair(64);
    let handle = hub.register(key, transport).unwrap();
    (handle, peer)
}

#[tokio::test]
async fn delivery_stats_track_refused_sends() {
    let hub = hub();
    let (handle, mut peer) = connect(&hub, "c1");
    let key = ClientKey::from("c1");
    let message = OutboundMessage::from(json!({"type": "ping-test"}));

    for _ in 0..10 {
        assert_ok!(hub.send_to(&key, &message).await);
    }
    assert_eq!(handle.stats.total_sent(), 10);
    assert_eq!(handle.stats.total_failed(), 0);
    assert_eq!(handle.stats.success_rate(), 100.0);
    assert_eq!(handle.stats.last_failure(), (None, String::new()));

    // Sends 1, 3 and 5 of the next five are refused, each for its own reason
    let faults = peer.faults();
    let mut before_last_failure = None;
    for attempt in 1..=5 {
        if attempt % 2 == 1 {
            faults.refuse_with(format!("quota-{}", attempt / 2 + 1));
        }
        if attempt == 5 {
            before_last_failure = Some(chrono::Utc::now());
        }
        let result = hub.send_to(&key, &message).await;
        assert_eq!(result.is_err(), attempt % 2 == 1, "attempt {attempt}");
    }

    assert_eq!(handle.stats.total_sent(), 15);
    assert_eq!(handle.stats.total_failed(), 3);
    assert!((handle.stats.success_rate() - 80.0).abs() < 1e-9);

    let (at, reason) = handle.stats.last_failure();
    assert!(at.unwrap() >= before_last_failure.unwrap());
    assert_eq!(
        reason,
        SendError::Rejected(TransportError::Refused("quota-3".to_string())).to_string()
    );
    assert!(!reason.contains("quota-2"));

    // Refused frames never reached the peer; the connection stayed open
    let mut received = 0;
    while peer.try_recv().is_some() {
        received += 1;
    }
    assert_eq!(received, 12);
    assert!(hub.contains(&key));
}

#[tokio::test]
async fn duplicate_key_is_rejected_until_unregistered() {
    let hub = hub();
    let key = ClientKey::from("c1");
    let (_first, _first_peer) = connect(&hub, "c1");

    let (second, mut second_peer) = pair(4);
    let rejected = hub.register("c1", second).unwrap_err();
    assert!(matches!(&rejected.error, HubError::DuplicateKey(k) if *k == key));
    assert_eq!(second_peer.faults().close_calls(), 0);

    assert!(hub.unregister(&key).await);

    // The rejected transport is still usable once the key is free
    let handle = assert_ok!(hub.register("c1", rejected.into_transport()));
    assert_eq!(hub.len(), 1);
    assert_ok!(hub.send_to(&key, &OutboundMessage::text("second try")).await);
    assert_eq!(
        second_peer.recv().await,
        Some(Frame::Text("second try".to_string()))
    );
    assert_eq!(handle.stats.total_sent(), 1);
}

#[tokio::test]
async fn closed_connection_rejects_sends() {
    let hub = hub();
    let (handle, _peer) = connect(&hub, "c1");
    let message = OutboundMessage::text("hello");

    handle.connection.send(&message).await.unwrap();
    for _ in 0..3 {
        handle.connection.close().await.unwrap();
    }
    assert!(!handle.connection.is_connected().await);

    assert!(matches!(
        handle.connection.send(&message).await,
        Err(SendError::AlreadyClosed)
    ));
}

#[tokio::test]
async fn broadcast_reaches_every_matching_client() {
    let hub = hub();
    let mut peers = Vec::new();
    for key in ["team-a:1", "team-a:2", "team-b:1", "team-b:2", "team-b:3"] {
        peers.push(connect(&hub, key));
    }

    let report = hub
        .broadcast_where(&json!({"type": "deploy"}).into(), |key| {
            key.as_str().starts_with("team-b")
        })
        .await;
    assert_eq!(report.targeted, 3);
    assert_eq!(report.delivered, 3);

    let report = hub.broadcast(&OutboundMessage::text("all")).await;
    assert_eq!(report.delivered, 5);

    let envelope = Envelope::to_keys(
        vec![ClientKey::from("team-a:1"), ClientKey::from("gone")],
        OutboundMessage::text("direct"),
    );
    let report = hub.publish(&envelope).await;
    assert_eq!((report.delivered, report.missing), (1, 1));

    for (handle, peer) in &mut peers {
        let first = peer.recv().await.unwrap();
        let b_team = handle.key.as_str().starts_with("team-b");
        if b_team {
            assert!(matches!(first, Frame::Text(ref text) if text.contains("deploy")));
        } else {
            assert_eq!(first, Frame::Text("all".to_string()));
        }
    }

    let summary = hub.summary();
    assert_eq!(summary.total_connections, 5);
    assert_eq!(summary.total_sent, 9);
    assert_eq!(summary.total_failed, 0);
}

#[tokio::test]
async fn peer_hang_up_removes_connection() {
    let hub = hub();
    let (handle, mut peer) = connect(&hub, "c1");

    peer.hang_up();
    tokio::time::timeout(Duration::from_secs(1), handle.closed())
        .await
        .unwrap();

    assert!(!hub.contains(&ClientKey::from("c1")));
    assert!(matches!(
        hub.send_to(&ClientKey::from("c1"), &OutboundMessage::text("late")).await,
        Err(HubError::NotFound(_))
    ));
}
