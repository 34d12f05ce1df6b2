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

//! Integration tests for the client heartbeat.
//!
//! The relay runs with an aggressively short sweep interval so that a client
//! which failed to heartbeat would be reaped within a fraction of a second.
//! A correctly heartbeating client must hold its seat through many sweep
//! windows and still be able to chat afterwards. A frame-counting stub
//! server additionally pins down the beacon cadence and its hard stop on
//! disconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use careline_client::config::ClientConfig;
use careline_client::events::{ClientEvent, ConnectionStatus};
use careline_client::manager::ChatClient;
use careline_proto::codec;
use careline_proto::envelope::{Envelope, MAX_TEXT_LEN};
use careline_proto::identity::{Identity, ParticipantId, Role};
use careline_relay::relay::RelayState;
use futures_util::StreamExt;
use tokio::sync::mpsc;

// =============================================================================
// Helpers
// =============================================================================

/// Sweep interval used by every test in this file. Short enough that an idle
/// run covers several full mark-then-reap cycles.
const SWEEP_INTERVAL: Duration = Duration::from_millis(150);

async fn start_relay() -> (String, Arc<RelayState>, tokio::task::JoinHandle<()>) {
    let state = Arc::new(RelayState::with_config(MAX_TEXT_LEN, SWEEP_INTERVAL));
    let (addr, handle) =
        careline_relay::relay::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
            .await
            .expect("failed to start relay server");
    (format!("ws://{addr}/ws"), state, handle)
}

/// Client config whose heartbeat is several times faster than the sweep.
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

fn doctor() -> Identity {
    Identity::new(ParticipantId::new("d-1"), Role::Doctor, "Dr. Osei")
}

/// Start a minimal WebSocket server that accepts one connection and counts
/// the heartbeat envelopes it receives. Used to observe the beacon cadence
/// directly, without relay bookkeeping in between.
async fn start_counting_server() -> (String, Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("ws://{addr}/ws");
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = Arc::clone(&count);

    let handle = tokio::spawn(async move {
        // Accept exactly one connection.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws_stream = tokio_tungstenite::accept_async(stream).await.unwrap();

        while let Some(Ok(frame)) = ws_stream.next().await {
            if let tokio_tungstenite::tungstenite::Message::Text(text) = frame
                && let Ok(Envelope::Heartbeat { .. }) = codec::decode(&text)
            {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    (url, count, handle)
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

// =============================================================================
// Tests
// =============================================================================

/// An idle but heartbeating client keeps its registry seat across many
/// sweep windows.
#[tokio::test]
async fn idle_client_survives_liveness_sweeps() {
    let (url, state, _handle) = start_relay().await;
    let (client, mut rx) = ChatClient::new(test_config(&url));

    client
        .connect(patient(), ParticipantId::new("d-1"))
        .await
        .unwrap();
    wait_for_event(&mut rx, "room assignment", |evt| {
        matches!(evt, ClientEvent::Connected { .. })
    })
    .await;
    assert_eq!(state.registry.len().await, 1);

    // Sit idle through roughly six sweep windows.
    tokio::time::sleep(SWEEP_INTERVAL * 6).await;

    assert_eq!(
        state.registry.len().await,
        1,
        "heartbeating client lost its seat to the sweep"
    );
    assert_eq!(client.status(), ConnectionStatus::Connected);

    // The reconnect supervisor never woke up during the idle stretch.
    while let Ok(evt) = rx.try_recv() {
        assert!(
            !matches!(
                evt,
                ClientEvent::Disconnected | ClientEvent::Reconnecting { .. }
            ),
            "idle client saw a connection interruption: {evt:?}"
        );
    }
}

/// After an idle stretch long enough to reap a silent connection, a
/// heartbeating pair can still exchange messages.
#[tokio::test]
async fn chat_still_flows_after_idle_period() {
    let (url, state, _handle) = start_relay().await;

    let (patient_client, mut patient_rx) = ChatClient::new(test_config(&url));
    patient_client
        .connect(patient(), ParticipantId::new("d-1"))
        .await
        .unwrap();
    wait_for_event(&mut patient_rx, "patient room assignment", |evt| {
        matches!(evt, ClientEvent::Connected { .. })
    })
    .await;

    let (doctor_client, mut doctor_rx) = ChatClient::new(test_config(&url));
    doctor_client
        .connect(doctor(), ParticipantId::new("p-1"))
        .await
        .unwrap();
    wait_for_event(&mut doctor_rx, "doctor room assignment", |evt| {
        matches!(evt, ClientEvent::Connected { .. })
    })
    .await;
    wait_for_event(&mut patient_rx, "doctor online", |evt| {
        matches!(evt, ClientEvent::PeerStatusChanged { online: true, .. })
    })
    .await;

    tokio::time::sleep(SWEEP_INTERVAL * 6).await;
    assert_eq!(state.registry.len().await, 2);

    patient_client
        .send_chat_message("Still here after the quiet spell")
        .unwrap();
    let evt = wait_for_event(&mut doctor_rx, "message after idle", |evt| {
        matches!(evt, ClientEvent::MessageReceived(_))
    })
    .await;
    match evt {
        ClientEvent::MessageReceived(entry) => {
            assert_eq!(entry.text, "Still here after the quiet spell");
            assert_eq!(entry.sender_name, "Ana");
        }
        other => panic!("expected MessageReceived, got: {other:?}"),
    }

    // Neither side was bounced while idle.
    assert_eq!(patient_client.status(), ConnectionStatus::Connected);
    assert_eq!(doctor_client.status(), ConnectionStatus::Connected);
}

/// Heartbeats arrive at the configured cadence while connected, and stop
/// entirely once the client disconnects.
#[tokio::test]
async fn beacons_follow_the_interval_and_stop_on_disconnect() {
    let (url, count, _handle) = start_counting_server().await;

    let mut config = test_config(&url);
    config.heartbeat_interval = Duration::from_millis(100);
    let (client, _rx) = ChatClient::new(config);
    client
        .connect(patient(), ParticipantId::new("d-1"))
        .await
        .unwrap();

    // Four intervals and change: at least three beacons must have landed.
    tokio::time::sleep(Duration::from_millis(450)).await;
    let while_connected = count.load(Ordering::SeqCst);
    assert!(
        while_connected >= 3,
        "expected at least 3 heartbeats, counted {while_connected}"
    );

    client.disconnect();

    // Allow any frame already handed to the writer to land, then verify
    // the cadence is over.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let after_disconnect = count.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        count.load(Ordering::SeqCst),
        after_disconnect,
        "heartbeats kept flowing after disconnect"
    );
}
