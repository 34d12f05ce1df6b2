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

//! Integration tests for the relay's liveness sweep.
//!
//! A connection that stops heartbeating must be reaped within two sweep
//! windows, its peer must hear `peer_offline`, and the vacated seat must be
//! available for a live replacement. The silent participant is simulated
//! with a raw WebSocket that completes the URL handshake but never sends a
//! single frame.

use std::sync::Arc;
use std::time::Duration;

use careline_client::config::ClientConfig;
use careline_client::events::{ClientEvent, ConnectionStatus};
use careline_client::manager::ChatClient;
use careline_proto::envelope::MAX_TEXT_LEN;
use careline_proto::identity::{Identity, ParticipantId, Role};
use careline_relay::relay::RelayState;
use futures_util::StreamExt;
use tokio::sync::mpsc;

// =============================================================================
// Helpers
// =============================================================================

const SWEEP_INTERVAL: Duration = Duration::from_millis(150);

async fn start_relay() -> (String, Arc<RelayState>, tokio::task::JoinHandle<()>) {
    let state = Arc::new(RelayState::with_config(MAX_TEXT_LEN, SWEEP_INTERVAL));
    let (addr, handle) =
        careline_relay::relay::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
            .await
            .expect("failed to start relay server");
    (format!("ws://{addr}/ws"), state, handle)
}

fn test_config(url: &str) -> ClientConfig {
    let mut config = ClientConfig::new(url.to_owned());
    config.connect_timeout = Duration::from_secs(2);
    config.heartbeat_interval = Duration::from_millis(40);
    config.reconnect.retry_interval = Duration::from_millis(100);
    config.reconnect.max_attempts = 3;
    config
}

fn patient() -> Identity {
    Identity::new(ParticipantId::new("p-1"), Role::Patient, "Ana")
}

/// Opens a raw WebSocket seat for the doctor without a heartbeat task, or
/// any other frame traffic. A background task drains server frames so the
/// socket stays readable until the relay closes it.
async fn connect_silent_doctor(relay_url: &str) -> tokio::task::JoinHandle<()> {
    let mut url = url::Url::parse(relay_url).expect("relay url must parse");
    url.query_pairs_mut()
        .append_pair("participant_id", "d-1")
        .append_pair("peer_id", "p-1")
        .append_pair("display_name", "Dr. Osei")
        .append_pair("role", "doctor");

    let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .expect("silent doctor failed to connect");

    tokio::spawn(async move {
        let (_sink, mut stream) = socket.split();
        while let Some(frame) = stream.next().await {
            if frame.is_err() {
                break;
            }
        }
    })
}

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

/// Polls the registry until it holds exactly `expected` seats.
async fn wait_for_registry_len(state: &Arc<RelayState>, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if state.registry.len().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "registry never reached {expected} seats, still at {}",
        state.registry.len().await
    );
}

// =============================================================================
// Tests
// =============================================================================

/// A connection that never heartbeats is swept out, and its peer hears
/// about the departure.
#[tokio::test]
async fn silent_connection_is_reaped_and_announced() {
    let (url, state, _handle) = start_relay().await;

    let (patient_client, mut patient_rx) = ChatClient::new(test_config(&url));
    patient_client
        .connect(patient(), ParticipantId::new("d-1"))
        .await
        .unwrap();
    wait_for_event(&mut patient_rx, "room assignment", |evt| {
        matches!(evt, ClientEvent::Connected { .. })
    })
    .await;

    let _drain = connect_silent_doctor(&url).await;
    wait_for_event(&mut patient_rx, "silent doctor online", |evt| {
        matches!(evt, ClientEvent::PeerStatusChanged { online: true, .. })
    })
    .await;
    assert_eq!(state.registry.len().await, 2);

    // No heartbeats arrive from the doctor seat, so the second sweep after
    // its registration reaps it.
    let evt = wait_for_event(&mut patient_rx, "silent doctor reaped", |evt| {
        matches!(evt, ClientEvent::PeerStatusChanged { online: false, .. })
    })
    .await;
    match evt {
        ClientEvent::PeerStatusChanged { peer_id, .. } => {
            assert_eq!(peer_id, ParticipantId::new("d-1"));
        }
        other => panic!("expected PeerStatusChanged, got: {other:?}"),
    }

    wait_for_registry_len(&state, 1).await;

    // The heartbeating patient rides out every sweep.
    assert_eq!(patient_client.status(), ConnectionStatus::Connected);
}

/// The seat vacated by a reaped connection can be taken by a live client,
/// and messaging works across the replacement.
#[tokio::test]
async fn reaped_seat_is_retaken_by_a_live_client() {
    let (url, state, _handle) = start_relay().await;

    let (patient_client, mut patient_rx) = ChatClient::new(test_config(&url));
    patient_client
        .connect(patient(), ParticipantId::new("d-1"))
        .await
        .unwrap();
    wait_for_event(&mut patient_rx, "room assignment", |evt| {
        matches!(evt, ClientEvent::Connected { .. })
    })
    .await;

    let _drain = connect_silent_doctor(&url).await;
    wait_for_event(&mut patient_rx, "silent doctor online", |evt| {
        matches!(evt, ClientEvent::PeerStatusChanged { online: true, .. })
    })
    .await;
    wait_for_event(&mut patient_rx, "silent doctor reaped", |evt| {
        matches!(evt, ClientEvent::PeerStatusChanged { online: false, .. })
    })
    .await;
    wait_for_registry_len(&state, 1).await;

    // A proper client claims the same doctor identity.
    let (doctor_client, mut doctor_rx) = ChatClient::new(test_config(&url));
    doctor_client
        .connect(
            Identity::new(ParticipantId::new("d-1"), Role::Doctor, "Dr. Osei"),
            ParticipantId::new("p-1"),
        )
        .await
        .unwrap();
    wait_for_event(&mut doctor_rx, "doctor room assignment", |evt| {
        matches!(evt, ClientEvent::Connected { .. })
    })
    .await;
    wait_for_event(&mut patient_rx, "doctor back online", |evt| {
        matches!(evt, ClientEvent::PeerStatusChanged { online: true, .. })
    })
    .await;

    patient_client
        .send_chat_message("Glad you are back, doctor")
        .unwrap();
    let evt = wait_for_event(&mut doctor_rx, "message to the replacement", |evt| {
        matches!(evt, ClientEvent::MessageReceived(_))
    })
    .await;
    match evt {
        ClientEvent::MessageReceived(entry) => {
            assert_eq!(entry.text, "Glad you are back, doctor");
            assert_eq!(entry.sender_name, "Ana");
        }
        other => panic!("expected MessageReceived, got: {other:?}"),
    }
}
