// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::needless_continue,
    clippy::match_same_arms,
    clippy::doc_markdown,
    clippy::manual_let_else,
    clippy::future_not_send,
    clippy::redundant_pub_crate,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for consultation pairing.
//!
//! Two clients announcing each other as peers must land in the same room,
//! regardless of connection order, and each side must hear about the other's
//! arrival and departure. Distinct pairs must never share a room.

use std::sync::Arc;
use std::time::Duration;

use careline_client::config::ClientConfig;
use careline_client::events::ClientEvent;
use careline_client::manager::ChatClient;
use careline_proto::identity::{Identity, ParticipantId, Role};
use careline_relay::relay::RelayState;
use tokio::sync::mpsc;

// =============================================================================
// Helpers
// =============================================================================

/// Start a relay on an OS-assigned port, returning its URL and shared state.
async fn start_relay() -> (String, Arc<RelayState>, tokio::task::JoinHandle<()>) {
    let state = Arc::new(RelayState::new());
    let (addr, handle) =
        careline_relay::relay::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
            .await
            .expect("failed to start relay server");
    (format!("ws://{addr}/ws"), state, handle)
}

fn test_config(url: &str) -> ClientConfig {
    let mut config = ClientConfig::new(url.to_owned());
    config.connect_timeout = Duration::from_secs(2);
    config.heartbeat_interval = Duration::from_millis(200);
    config.reconnect.retry_interval = Duration::from_millis(100);
    config.reconnect.max_attempts = 3;
    config
}

/// Connect a client as `id`/`name` with the given role, paired to `peer`.
async fn connect_client(
    url: &str,
    id: &str,
    name: &str,
    role: Role,
    peer: &str,
) -> (ChatClient, mpsc::Receiver<ClientEvent>) {
    let (client, rx) = ChatClient::new(test_config(url));
    client
        .connect(
            Identity::new(ParticipantId::new(id), role, name),
            ParticipantId::new(peer),
        )
        .await
        .expect("connect failed");
    (client, rx)
}

/// Wait for a specific event matching a predicate, with timeout.
///
/// Skips non-matching events. Panics on timeout or channel close.
async fn wait_for_event<F>(
    rx: &mut mpsc::Receiver<ClientEvent>,
    description: &str,
    pred: F,
) -> ClientEvent
where
    F: Fn(&ClientEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        let remaining = deadline - tokio::time::Instant::now();
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some(evt)) if pred(&evt) => return evt,
            Ok(Some(_other)) => continue,
            Ok(None) => panic!("channel closed while waiting for {description}"),
            Err(_) => break,
        }
    }
    panic!("timeout waiting for {description}");
}

/// Wait for the room assignment and return the key.
async fn wait_for_room(rx: &mut mpsc::Receiver<ClientEvent>) -> careline_proto::identity::RoomKey {
    let evt = wait_for_event(rx, "Connected { room_key }", |evt| {
        matches!(evt, ClientEvent::Connected { .. })
    })
    .await;
    match evt {
        ClientEvent::Connected { room_key } => room_key,
        other => panic!("expected Connected, got: {other:?}"),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn both_participants_land_in_the_same_room() {
    let (url, state, _handle) = start_relay().await;

    let (_patient, mut patient_rx) =
        connect_client(&url, "p-1", "Ana", Role::Patient, "d-1").await;
    let (_doctor, mut doctor_rx) =
        connect_client(&url, "d-1", "Dr. Osei", Role::Doctor, "p-1").await;

    let patient_room = wait_for_room(&mut patient_rx).await;
    let doctor_room = wait_for_room(&mut doctor_rx).await;

    assert_eq!(patient_room, doctor_room);
    assert_eq!(state.rooms.len().await, 1);
}

#[tokio::test]
async fn room_key_ignores_connection_order() {
    let (url, _state, _handle) = start_relay().await;

    // Doctor first this time.
    let (_doctor, mut doctor_rx) =
        connect_client(&url, "d-2", "Dr. Osei", Role::Doctor, "p-2").await;
    let doctor_room = wait_for_room(&mut doctor_rx).await;

    let (_patient, mut patient_rx) =
        connect_client(&url, "p-2", "Ana", Role::Patient, "d-2").await;
    let patient_room = wait_for_room(&mut patient_rx).await;

    assert_eq!(patient_room, doctor_room);
}

#[tokio::test]
async fn arrival_is_announced_to_both_sides() {
    let (url, _state, _handle) = start_relay().await;

    let (_patient, mut patient_rx) =
        connect_client(&url, "p-1", "Ana", Role::Patient, "d-1").await;
    wait_for_room(&mut patient_rx).await;

    let (_doctor, mut doctor_rx) =
        connect_client(&url, "d-1", "Dr. Osei", Role::Doctor, "p-1").await;

    // The late joiner triggers presence in both directions.
    let evt = wait_for_event(&mut patient_rx, "patient sees doctor online", |evt| {
        matches!(evt, ClientEvent::PeerStatusChanged { online: true, .. })
    })
    .await;
    match evt {
        ClientEvent::PeerStatusChanged { peer_id, .. } => {
            assert_eq!(peer_id, ParticipantId::new("d-1"));
        }
        other => panic!("expected PeerStatusChanged, got: {other:?}"),
    }

    let evt = wait_for_event(&mut doctor_rx, "doctor sees patient online", |evt| {
        matches!(evt, ClientEvent::PeerStatusChanged { online: true, .. })
    })
    .await;
    match evt {
        ClientEvent::PeerStatusChanged { peer_id, .. } => {
            assert_eq!(peer_id, ParticipantId::new("p-1"));
        }
        other => panic!("expected PeerStatusChanged, got: {other:?}"),
    }
}

#[tokio::test]
async fn departure_notifies_the_survivor() {
    let (url, _state, _handle) = start_relay().await;

    let (_patient, mut patient_rx) =
        connect_client(&url, "p-1", "Ana", Role::Patient, "d-1").await;
    let (doctor, _doctor_rx) = connect_client(&url, "d-1", "Dr. Osei", Role::Doctor, "p-1").await;

    wait_for_event(&mut patient_rx, "doctor online", |evt| {
        matches!(evt, ClientEvent::PeerStatusChanged { online: true, .. })
    })
    .await;

    doctor.disconnect();

    let evt = wait_for_event(&mut patient_rx, "doctor offline", |evt| {
        matches!(evt, ClientEvent::PeerStatusChanged { online: false, .. })
    })
    .await;
    match evt {
        ClientEvent::PeerStatusChanged { peer_id, .. } => {
            assert_eq!(peer_id, ParticipantId::new("d-1"));
        }
        other => panic!("expected PeerStatusChanged, got: {other:?}"),
    }
}

#[tokio::test]
async fn distinct_pairs_get_distinct_rooms() {
    let (url, state, _handle) = start_relay().await;

    let (_p1, mut p1_rx) = connect_client(&url, "p-1", "Ana", Role::Patient, "d-1").await;
    let (_d1, mut d1_rx) = connect_client(&url, "d-1", "Dr. Osei", Role::Doctor, "p-1").await;
    let (_p2, mut p2_rx) = connect_client(&url, "p-2", "Ben", Role::Patient, "d-2").await;
    let (_d2, mut d2_rx) = connect_client(&url, "d-2", "Dr. Lind", Role::Doctor, "p-2").await;

    let room_a = wait_for_room(&mut p1_rx).await;
    assert_eq!(wait_for_room(&mut d1_rx).await, room_a);
    let room_b = wait_for_room(&mut p2_rx).await;
    assert_eq!(wait_for_room(&mut d2_rx).await, room_b);

    assert_ne!(room_a, room_b);
    assert_eq!(state.rooms.len().await, 2);
    assert_eq!(state.registry.len().await, 4);
}
