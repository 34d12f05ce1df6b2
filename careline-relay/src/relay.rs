//! Relay server core: shared state, WebSocket handshake, connection worker,
//! and the envelope dispatcher.
//!
//! Each accepted socket gets a worker task plus a writer task fed over an
//! mpsc channel. The worker validates the URL handshake, seats the
//! connection in its consultation room, exchanges presence, and dispatches
//! inbound envelopes until the socket closes. A background sweep reaps
//! connections that stop heartbeating.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use careline_proto::codec::{self, DecodeError};
use careline_proto::envelope::{
    AckStatus, Envelope, MAX_TEXT_LEN, MessageId, Timestamp, validate_text_with,
};
use careline_proto::identity::{Identity, ParticipantId, Role, RoomKey};

use crate::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
use crate::rooms::{Occupant, RoomDirectory};

/// WebSocket close code sent when the handshake violates connection policy.
const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Default interval between liveness sweeps.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Notice text delivered to a sender whose peer seat is empty.
const PEER_OFFLINE_NOTICE: &str =
    "Your peer is currently offline and will not receive this message.";

/// Shared relay server state holding the connection registry and the room
/// directory.
pub struct RelayState {
    /// Live sockets keyed by participant identity.
    pub registry: ConnectionRegistry,
    /// Active consultation rooms keyed by pair.
    pub rooms: RoomDirectory,
    /// Maximum allowed chat text length in bytes.
    max_text_len: usize,
    /// Interval between liveness sweeps.
    sweep_interval: Duration,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates relay state with an empty registry and room directory, using
    /// default text and sweep limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MAX_TEXT_LEN, DEFAULT_SWEEP_INTERVAL)
    }

    /// Creates relay state with custom limits from the resolved
    /// [`crate::config::RelayConfig`].
    #[must_use]
    pub fn with_config(max_text_len: usize, sweep_interval: Duration) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rooms: RoomDirectory::new(),
            max_text_len,
            sweep_interval,
        }
    }
}

/// Query parameters carried by the `/ws` connection URL.
///
/// All fields are optional at the extraction layer; validation happens after
/// the upgrade so a violation can be answered with a policy close rather
/// than an opaque HTTP rejection.
#[derive(Debug, Default, serde::Deserialize)]
pub struct ConnectQuery {
    /// Identity of the connecting participant.
    #[serde(default)]
    pub participant_id: Option<String>,
    /// Identity of the participant on the other side of the consultation.
    #[serde(default)]
    pub peer_id: Option<String>,
    /// Name shown to the peer.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Explicit role claim (`patient` or `doctor`) from the identity layer.
    #[serde(default)]
    pub role: Option<String>,
}

/// A validated handshake: who connected, and whom they consult with.
struct Handshake {
    identity: Identity,
    peer_id: ParticipantId,
}

/// Validates raw query parameters into a handshake, or returns the reason
/// carried by the policy close frame.
fn validate_handshake(query: &ConnectQuery) -> Result<Handshake, String> {
    let participant_id = match query.participant_id.as_deref() {
        Some(id) if !id.is_empty() => ParticipantId::new(id),
        _ => return Err("missing participant_id".to_owned()),
    };
    if participant_id.is_system() {
        return Err("participant_id is reserved".to_owned());
    }
    let peer_id = match query.peer_id.as_deref() {
        Some(id) if !id.is_empty() => ParticipantId::new(id),
        _ => return Err("missing peer_id".to_owned()),
    };
    let role: Role = match query.role.as_deref() {
        Some(claim) => claim.parse().map_err(|e| format!("{e}"))?,
        None => return Err("missing role".to_owned()),
    };
    let display_name = query
        .display_name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| participant_id.to_string());
    Ok(Handshake {
        identity: Identity::new(participant_id, role, display_name),
        peer_id,
    })
}

/// Connection-scoped context threaded through the dispatcher.
struct ConnectionCtx {
    participant_id: ParticipantId,
    display_name: String,
    role: Role,
    room_key: RoomKey,
    connection_id: ConnectionId,
    /// Writer channel of this connection, used for acks and notices.
    reply: mpsc::UnboundedSender<Message>,
}

/// Handles an upgraded WebSocket connection for a single participant.
///
/// The connection lifecycle:
/// 1. Validate the URL handshake; policy close on violation.
/// 2. Register the connection and seat it in its consultation room,
///    superseding any previous connection for the same participant or seat.
/// 3. Send the `connect` ack carrying the room key, then exchange presence.
/// 4. Run the reader loop while a writer task drains the channel.
/// 5. On exit, id-checked cleanup and `peer_offline` to the survivor.
pub async fn handle_socket(mut socket: WebSocket, query: ConnectQuery, state: Arc<RelayState>) {
    let handshake = match validate_handshake(&query) {
        Ok(handshake) => handshake,
        Err(reason) => {
            tracing::warn!(reason = %reason, "rejecting connection with policy close");
            let frame = CloseFrame {
                code: CLOSE_POLICY_VIOLATION,
                reason: reason.into(),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    let Handshake { identity, peer_id } = handshake;
    let participant_id = identity.participant_id.clone();
    let role = identity.role;
    let room_key = RoomKey::for_pair(&participant_id, &peer_id);
    let connection_id = ConnectionId::next();

    tracing::info!(
        participant = %participant_id,
        role = %role,
        room = %room_key,
        connection = %connection_id,
        "participant connecting"
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel feeding this connection's writer task.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let handle = ConnectionHandle::new(
        connection_id,
        participant_id.clone(),
        role,
        room_key.clone(),
        identity.display_name.clone(),
        tx.clone(),
    );
    if state.registry.insert(handle).await.is_some() {
        tracing::info!(participant = %participant_id, "superseded previous connection for participant");
    }

    let occupant = Occupant {
        connection_id,
        participant_id: participant_id.clone(),
        display_name: identity.display_name.clone(),
    };
    if let Some(displaced) = state.rooms.occupy(&room_key, role, occupant).await {
        // The displaced socket stays open but stops receiving relay
        // traffic; the sweep or its own close reaps it.
        tracing::info!(
            room = %room_key,
            role = %role,
            displaced = %displaced.participant_id,
            "seat superseded"
        );
    }

    // The ack goes directly on the socket so it is the first frame the
    // client sees; the writer task has not started draining yet.
    let ack = Envelope::connect_ack(room_key.clone());
    if send_envelope(&mut ws_sender, &ack).await.is_err() {
        tracing::warn!(participant = %participant_id, "failed to send connect ack");
        cleanup_connection(&state, &participant_id, role, &room_key, connection_id).await;
        return;
    }

    // Presence exchange: the arrival learns its peer is already seated, and
    // the peer learns the arrival came online.
    if let Some(peer) = state.rooms.peer_of(&room_key, role).await {
        send_via(
            &tx,
            &Envelope::PeerOnline {
                peer_id: peer.participant_id.clone(),
            },
        );
        if let Some(peer_sender) = state
            .registry
            .sender_for(&peer.participant_id, peer.connection_id)
            .await
        {
            send_via(
                &peer_sender,
                &Envelope::PeerOnline {
                    peer_id: participant_id.clone(),
                },
            );
        }
    }

    // Writer task: drains the channel onto the socket.
    let writer_participant = participant_id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(frame).await.is_err() {
                tracing::warn!(participant = %writer_participant, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: dispatch inbound frames until close or graceful leave.
    let ctx = ConnectionCtx {
        participant_id: participant_id.clone(),
        display_name: identity.display_name,
        role,
        room_key: room_key.clone(),
        connection_id,
        reply: tx,
    };
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = ws_receiver.next().await {
            match frame {
                Message::Text(text) => {
                    if dispatch_frame(&reader_state, &ctx, text.as_str()).await {
                        break;
                    }
                }
                Message::Close(_) => {
                    tracing::info!(participant = %ctx.participant_id, "received close frame");
                    break;
                }
                _ => {
                    // Binary, ping, and pong frames are not part of the
                    // protocol.
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    cleanup_connection(&state, &participant_id, role, &room_key, connection_id).await;
    tracing::info!(
        participant = %participant_id,
        connection = %connection_id,
        "participant disconnected"
    );
}

/// Decodes and dispatches one inbound text frame.
///
/// Returns `true` when the envelope was a graceful leave and the reader
/// loop should stop.
async fn dispatch_frame(state: &Arc<RelayState>, ctx: &ConnectionCtx, text: &str) -> bool {
    let envelope = match codec::decode(text) {
        Ok(envelope) => envelope,
        Err(DecodeError::UnknownType { found }) => {
            tracing::warn!(
                participant = %ctx.participant_id,
                found = %found,
                "dropping envelope with unknown type"
            );
            return false;
        }
        Err(err @ DecodeError::Malformed(_)) => {
            tracing::warn!(participant = %ctx.participant_id, error = %err, "malformed frame");
            send_via(
                &ctx.reply,
                &Envelope::Error {
                    error: err.to_string(),
                },
            );
            return false;
        }
    };

    let kind = envelope.type_name();
    match envelope {
        Envelope::Message {
            message_id, text, ..
        } => {
            // Claimed sender identity in the envelope is ignored; the
            // handshake identity is authoritative.
            relay_chat_message(state, ctx, message_id, text).await;
        }
        Envelope::Heartbeat { .. } => {
            if !state
                .registry
                .mark_alive(&ctx.participant_id, ctx.connection_id)
                .await
            {
                tracing::debug!(
                    participant = %ctx.participant_id,
                    "heartbeat from superseded connection ignored"
                );
            }
        }
        Envelope::Connect { .. } => {
            // Identity was already established by the URL handshake; the
            // announcement is informational.
            tracing::debug!(participant = %ctx.participant_id, "connect announcement received");
        }
        Envelope::Disconnect { .. } => {
            tracing::info!(participant = %ctx.participant_id, "graceful disconnect");
            return true;
        }
        Envelope::MessageAck { .. }
        | Envelope::PeerOnline { .. }
        | Envelope::PeerOffline { .. }
        | Envelope::Error { .. } => {
            tracing::warn!(
                participant = %ctx.participant_id,
                kind = kind,
                "dropping server-only envelope sent by client"
            );
        }
    }
    false
}

/// Acks an inbound chat message, then forwards a re-stamped copy to the
/// peer, or answers with a system notice when the peer seat is empty.
async fn relay_chat_message(
    state: &Arc<RelayState>,
    ctx: &ConnectionCtx,
    message_id: MessageId,
    text: String,
) {
    if let Err(err) = validate_text_with(&text, state.max_text_len) {
        tracing::warn!(participant = %ctx.participant_id, error = %err, "rejecting chat text");
        send_via(
            &ctx.reply,
            &Envelope::Error {
                error: err.to_string(),
            },
        );
        return;
    }

    // The receipt confirmation is local; it never waits on the forward.
    send_via(
        &ctx.reply,
        &Envelope::MessageAck {
            message_id,
            status: AckStatus::Received,
        },
    );

    let Some(peer) = state.rooms.peer_of(&ctx.room_key, ctx.role).await else {
        deliver_offline_notice(ctx);
        return;
    };
    let Some(peer_sender) = state
        .registry
        .sender_for(&peer.participant_id, peer.connection_id)
        .await
    else {
        // The seat points at a connection the registry no longer owns.
        deliver_offline_notice(ctx);
        return;
    };

    let forwarded = Envelope::Message {
        message_id: MessageId::new(),
        participant_id: ctx.participant_id.clone(),
        display_name: ctx.display_name.clone(),
        text,
        timestamp: Timestamp::now(),
    };
    tracing::debug!(
        from = %ctx.participant_id,
        to = %peer.participant_id,
        room = %ctx.room_key,
        "relaying message"
    );
    if let Some(frame) = text_frame(&forwarded)
        && peer_sender.send(frame).is_err()
    {
        // The peer writer is gone; drop the registry entry now and treat
        // this message as sent while the peer was offline.
        state
            .registry
            .remove(&peer.participant_id, peer.connection_id)
            .await;
        deliver_offline_notice(ctx);
    }
}

/// Tells the sender its peer is offline, as a system-authored chat line.
fn deliver_offline_notice(ctx: &ConnectionCtx) {
    tracing::debug!(
        participant = %ctx.participant_id,
        room = %ctx.room_key,
        "peer seat empty, delivering offline notice"
    );
    send_via(&ctx.reply, &Envelope::system_notice(PEER_OFFLINE_NOTICE));
}

/// Removes the connection from the registry and its room seat, then tells
/// the surviving peer it went offline.
async fn cleanup_connection(
    state: &Arc<RelayState>,
    participant_id: &ParticipantId,
    role: Role,
    room_key: &RoomKey,
    connection_id: ConnectionId,
) {
    state.registry.remove(participant_id, connection_id).await;
    vacate_and_notify(state, participant_id, role, room_key, connection_id).await;
}

/// Vacates the connection's seat (id-checked) and sends `peer_offline` to
/// the remaining occupant, if any.
async fn vacate_and_notify(
    state: &Arc<RelayState>,
    participant_id: &ParticipantId,
    role: Role,
    room_key: &RoomKey,
    connection_id: ConnectionId,
) {
    if state
        .rooms
        .vacate(room_key, role, connection_id)
        .await
        .is_some()
        && let Some(peer) = state.rooms.peer_of(room_key, role).await
        && let Some(peer_sender) = state
            .registry
            .sender_for(&peer.participant_id, peer.connection_id)
            .await
    {
        send_via(
            &peer_sender,
            &Envelope::PeerOffline {
                peer_id: participant_id.clone(),
            },
        );
    }
}

/// Spawns the background liveness sweep for the given state.
///
/// Every tick, connections that did not heartbeat since the previous tick
/// are closed and unseated; survivors are re-armed as not-alive for the
/// next round.
fn spawn_liveness_sweep(state: Arc<RelayState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so every connection
        // gets a full interval to heartbeat.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_once(&state).await;
        }
    })
}

/// One liveness pass over the registry.
async fn sweep_once(state: &Arc<RelayState>) {
    let reaped = state.registry.sweep().await;
    for handle in reaped {
        tracing::info!(
            participant = %handle.participant_id,
            connection = %handle.connection_id,
            "closing connection that missed its heartbeat window"
        );
        let _ = handle.sender.send(Message::Close(None));
        vacate_and_notify(
            state,
            &handle.participant_id,
            handle.role,
            &handle.room_key,
            handle.connection_id,
        )
        .await;
    }
}

/// Encodes an envelope into a text frame, logging on failure.
fn text_frame(envelope: &Envelope) -> Option<Message> {
    match codec::encode(envelope) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(error = %e, kind = envelope.type_name(), "failed to encode envelope");
            None
        }
    }
}

/// Queues an envelope on a connection's writer channel.
fn send_via(sender: &mpsc::UnboundedSender<Message>, envelope: &Envelope) {
    if let Some(frame) = text_frame(envelope) {
        let _ = sender.send(frame);
    }
}

/// Encodes and sends an envelope directly on a WebSocket sender.
async fn send_envelope(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    envelope: &Envelope,
) -> Result<(), axum::Error> {
    let Some(frame) = text_frame(envelope) else {
        return Ok(());
    };
    ws_sender.send(frame).await
}

/// Starts the relay server on the given address and returns the bound
/// address and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// Use [`RelayState::with_config`] to apply limits from the resolved
/// [`crate::config::RelayConfig`]. The liveness sweep is spawned alongside
/// the server.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    spawn_liveness_sweep(state);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::Query(query): axum::extract::Query<ConnectQuery>,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}
