//! Connection manager driving one consultation session.
//!
//! [`ChatClient`] owns the WebSocket connection to the relay and everything
//! that hangs off it:
//!
//! 1. A **writer task** that drains an unbounded frame channel into the
//!    socket sink, so sends never block the caller.
//! 2. A **reader task** that decodes incoming envelopes and applies them to
//!    the shared state (transcript updates, room key, peer presence).
//! 3. A **heartbeat task** that sends a liveness beacon at a fixed interval
//!    so the relay's sweep does not reap the connection.
//! 4. After an unexpected connection loss, a **reconnect supervisor** that
//!    retries on a fixed interval until the budget runs out.
//!
//! Tasks are scoped to a session epoch. `connect` and `disconnect` bump the
//! epoch; a task whose epoch is stale must not touch shared state, which
//! keeps a late frame from a dead socket out of the current transcript.
//! The state mutex is never held across an await point.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use careline_proto::codec;
use careline_proto::envelope::{Envelope, MessageId, Timestamp, ValidationError, validate_text};
use careline_proto::identity::{Identity, ParticipantId, RoomKey};

use crate::config::ClientConfig;
use crate::events::{ClientEvent, ConnectionStatus};
use crate::transcript::{ChatEntry, DeliveryState, Transcript};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Errors surfaced by [`ChatClient`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The operation needs an open session and there is none.
    #[error("not connected to the relay")]
    NotConnected,

    /// Outbound chat text failed validation.
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] ValidationError),

    /// The configured server URL does not parse.
    #[error("invalid relay URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The connection attempt did not complete within the configured timeout.
    #[error("connection attempt timed out")]
    ConnectTimeout,

    /// The WebSocket connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// A newer `connect` or `disconnect` call took over mid-attempt.
    #[error("superseded by a newer connect or disconnect call")]
    Superseded,

    /// Only entries in the failed state can be retried.
    #[error("message {0} is not eligible for retry")]
    RetryNotEligible(MessageId),
}

/// Mutable session state behind the manager's mutex.
struct ClientState {
    /// Current lifecycle state.
    status: ConnectionStatus,
    /// Identity announced at connect time; `None` when disconnected.
    identity: Option<Identity>,
    /// Peer this client asked to be paired with.
    peer_id: Option<ParticipantId>,
    /// Room assigned by the relay's handshake acknowledgment.
    room_key: Option<RoomKey>,
    /// Frame channel into the current session's writer task.
    writer: Option<mpsc::UnboundedSender<Message>>,
    /// Conversation history for the session.
    transcript: Transcript,
    /// Reader, heartbeat, and reconnect task handles for the current epoch.
    tasks: Vec<JoinHandle<()>>,
}

impl ClientState {
    const fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            identity: None,
            peer_id: None,
            room_key: None,
            writer: None,
            transcript: Transcript::new(),
            tasks: Vec::new(),
        }
    }
}

/// Shared core owned by the client handle and its background tasks.
struct Inner {
    config: ClientConfig,
    state: Mutex<ClientState>,
    /// Bumped by `connect` and `disconnect`; tasks from older epochs are void.
    epoch: AtomicU64,
    event_tx: mpsc::Sender<ClientEvent>,
}

/// Client-side connection manager for one participant in a consultation.
///
/// Created via [`ChatClient::new`], which also hands back the receiver for
/// [`ClientEvent`] notifications. All methods are safe to call from any
/// task; the manager never calls back into application code.
pub struct ChatClient {
    inner: Arc<Inner>,
}

impl ChatClient {
    /// Creates a disconnected client and the event channel the application
    /// should drain.
    #[must_use]
    pub fn new(config: ClientConfig) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let inner = Arc::new(Inner {
            config,
            state: Mutex::new(ClientState::new()),
            epoch: AtomicU64::new(0),
            event_tx,
        });
        (Self { inner }, event_rx)
    }

    /// Connects to the relay as `identity`, asking to be paired with
    /// `peer_id`.
    ///
    /// Calling this while already connected is a no-op. In any other state
    /// it starts a fresh session: any previous session tasks are cancelled,
    /// the socket is opened with the identity carried in the URL query, the
    /// identity announcement is sent, and the reader and heartbeat tasks
    /// are spawned. The assigned room arrives later as
    /// [`ClientEvent::Connected`].
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidUrl`] when the configured server URL does
    ///   not parse.
    /// - [`ClientError::ConnectTimeout`] when the attempt exceeds the
    ///   configured timeout.
    /// - [`ClientError::Connect`] when the WebSocket handshake fails. The
    ///   client is left in the error state.
    /// - [`ClientError::Superseded`] when another `connect` or `disconnect`
    ///   call raced this one.
    pub async fn connect(
        &self,
        identity: Identity,
        peer_id: ParticipantId,
    ) -> Result<(), ClientError> {
        let inner = &self.inner;
        {
            let state = inner.state.lock();
            if state.status == ConnectionStatus::Connected {
                tracing::debug!("connect called while already connected, ignoring");
                return Ok(());
            }
        }

        let epoch = begin_session(inner, identity, peer_id);
        match open_session(inner, epoch).await {
            Ok(()) => Ok(()),
            Err(err) => {
                fail_connect(inner, epoch);
                Err(err)
            }
        }
    }

    /// Tears the session down and suppresses automatic reconnection.
    ///
    /// Queues a best-effort leave announcement and a close frame on the
    /// dying writer, cancels every session task, and clears the stored
    /// identity. Safe to call repeatedly and from any state.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        inner.epoch.fetch_add(1, Ordering::SeqCst);

        let stale: Vec<JoinHandle<()>>;
        {
            let mut state = inner.state.lock();
            if let Some(writer) = state.writer.take() {
                let participant_id = state
                    .identity
                    .as_ref()
                    .map(|identity| identity.participant_id.clone());
                send_frame(&writer, &Envelope::Disconnect { participant_id });
                let _ = writer.send(Message::Close(None));
            }
            state.identity = None;
            state.peer_id = None;
            state.room_key = None;
            stale = state.tasks.drain(..).collect();
            set_status(inner, &mut state, ConnectionStatus::Disconnected);
        }

        // The writer task is not in this list: it drains the queued leave
        // announcement and exits once every sender handle is gone.
        for task in stale {
            task.abort();
        }
    }

    /// Sends a chat message to the paired peer.
    ///
    /// Appends a `Sending` entry to the transcript and hands the envelope
    /// to the writer task without waiting for the relay's ack; the ack
    /// later moves the entry to `Sent` and emits
    /// [`ClientEvent::MessageStatusChanged`].
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidMessage`] for empty or oversized text,
    ///   connected or not; nothing is recorded.
    /// - [`ClientError::NotConnected`] when no session is open. The text
    ///   is still recorded as a `Failed` entry so the user can retry it
    ///   once the connection is back.
    pub fn send_chat_message(&self, text: &str) -> Result<MessageId, ClientError> {
        // Checked ahead of the connection state, so a failed entry kept
        // for retry always holds sendable text.
        validate_text(text)?;

        let inner = &self.inner;
        let mut state = inner.state.lock();

        let (writer, identity) = match (state.status, state.writer.clone(), state.identity.clone())
        {
            (ConnectionStatus::Connected, Some(writer), Some(identity)) => (writer, identity),
            _ => {
                let message_id = record_failed_send(inner, &mut state, text);
                drop(state);
                tracing::debug!(
                    message_id = %message_id,
                    "send attempted while not connected, recorded as failed"
                );
                return Err(ClientError::NotConnected);
            }
        };

        let message_id = MessageId::new();
        let timestamp = Timestamp::now();
        let room_key = state.room_key.clone();
        state.transcript.push(ChatEntry {
            id: message_id,
            sender_name: identity.display_name.clone(),
            text: text.to_owned(),
            timestamp,
            is_from_self: true,
            status: DeliveryState::Sending,
            room_key,
        });
        drop(state);

        let envelope = Envelope::Message {
            message_id,
            participant_id: identity.participant_id,
            display_name: identity.display_name,
            text: text.to_owned(),
            timestamp,
        };
        if !send_frame(&writer, &envelope) {
            mark_send_failed(inner, message_id);
            return Err(ClientError::NotConnected);
        }
        Ok(message_id)
    }

    /// Retries a failed message, reusing its transcript slot.
    ///
    /// The entry gets a fresh message ID and timestamp and goes back to
    /// `Sending`; the returned ID is the one the relay will ack.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] when no session is open. The entry
    ///   stays `Failed` and can be retried later.
    /// - [`ClientError::RetryNotEligible`] when the ID is unknown or the
    ///   entry is not in the failed state.
    pub fn retry_message(&self, message_id: MessageId) -> Result<MessageId, ClientError> {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        let (writer, identity) = match (state.status, state.writer.clone(), state.identity.clone())
        {
            (ConnectionStatus::Connected, Some(writer), Some(identity)) => (writer, identity),
            _ => return Err(ClientError::NotConnected),
        };

        let Some(entry) = state.transcript.begin_retry(message_id) else {
            return Err(ClientError::RetryNotEligible(message_id));
        };
        drop(state);

        tracing::info!(
            old_id = %message_id,
            new_id = %entry.id,
            "retrying failed message"
        );
        emit(
            inner,
            ClientEvent::MessageStatusChanged {
                message_id: entry.id,
                status: DeliveryState::Sending,
            },
        );

        let envelope = Envelope::Message {
            message_id: entry.id,
            participant_id: identity.participant_id,
            display_name: identity.display_name,
            text: entry.text.clone(),
            timestamp: entry.timestamp,
        };
        if !send_frame(&writer, &envelope) {
            mark_send_failed(inner, entry.id);
            return Err(ClientError::NotConnected);
        }
        Ok(entry.id)
    }

    /// Current connection lifecycle state.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().status
    }

    /// Room assigned by the relay, once the handshake ack has arrived.
    #[must_use]
    pub fn room_key(&self) -> Option<RoomKey> {
        self.inner.state.lock().room_key.clone()
    }

    /// Snapshot of the transcript in insertion order.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatEntry> {
        self.inner.state.lock().transcript.entries().to_vec()
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Invalidates the previous session and marks the client as connecting.
///
/// Returns the new epoch; the caller threads it through every task it
/// spawns for this session.
fn begin_session(inner: &Arc<Inner>, identity: Identity, peer_id: ParticipantId) -> u64 {
    let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;

    let stale: Vec<JoinHandle<()>>;
    {
        let mut state = inner.state.lock();
        state.writer = None;
        state.room_key = None;
        state.identity = Some(identity);
        state.peer_id = Some(peer_id);
        stale = state.tasks.drain(..).collect();
        set_status(inner, &mut state, ConnectionStatus::Connecting);
    }
    for task in stale {
        task.abort();
    }
    epoch
}

/// Marks a failed explicit connect attempt, unless a newer call took over.
fn fail_connect(inner: &Arc<Inner>, epoch: u64) {
    let mut state = inner.state.lock();
    if inner.epoch.load(Ordering::SeqCst) != epoch {
        return;
    }
    set_status(inner, &mut state, ConnectionStatus::Error);
}

/// Opens the WebSocket, announces identity, and spawns the session tasks.
///
/// Used by both the explicit connect path and the reconnect supervisor;
/// the identity and peer are read from state, where `begin_session` put
/// them.
async fn open_session(inner: &Arc<Inner>, epoch: u64) -> Result<(), ClientError> {
    let (identity, peer_id) = {
        let state = inner.state.lock();
        match (state.identity.clone(), state.peer_id.clone()) {
            (Some(identity), Some(peer_id)) => (identity, peer_id),
            _ => return Err(ClientError::Superseded),
        }
    };
    let url = session_url(&inner.config.server_url, &identity, &peer_id)?;

    let (ws_stream, _response) =
        tokio::time::timeout(inner.config.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                tracing::warn!(url = %url, "relay connect timed out");
                ClientError::ConnectTimeout
            })?
            .map_err(|err| {
                tracing::warn!(url = %url, error = %err, "relay connect failed");
                ClientError::Connect(err.to_string())
            })?;

    if inner.epoch.load(Ordering::SeqCst) != epoch {
        return Err(ClientError::Superseded);
    }

    let (ws_sender, ws_reader) = ws_stream.split();
    let (writer_tx, writer_rx) = mpsc::unbounded_channel::<Message>();

    tokio::spawn(write_loop(ws_sender, writer_rx));
    let read_task = tokio::spawn(read_loop(Arc::clone(inner), epoch, ws_reader));
    let heartbeat_task = tokio::spawn(heartbeat_loop(Arc::clone(inner), epoch, writer_tx.clone()));

    {
        let mut state = inner.state.lock();
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            read_task.abort();
            heartbeat_task.abort();
            return Err(ClientError::Superseded);
        }
        state.writer = Some(writer_tx.clone());
        state.tasks.push(read_task);
        state.tasks.push(heartbeat_task);
        set_status(inner, &mut state, ConnectionStatus::Connected);
    }

    // First frame on the fresh channel, ahead of any heartbeat or chat.
    send_frame(&writer_tx, &Envelope::connect_announce(&identity));
    tracing::info!(
        participant_id = %identity.participant_id,
        peer_id = %peer_id,
        "connected to relay"
    );
    Ok(())
}

/// Builds the `/ws` URL with the handshake carried as query parameters.
fn session_url(
    server_url: &str,
    identity: &Identity,
    peer_id: &ParticipantId,
) -> Result<url::Url, ClientError> {
    let mut url = url::Url::parse(server_url)?;
    url.query_pairs_mut()
        .append_pair("participant_id", identity.participant_id.as_str())
        .append_pair("peer_id", peer_id.as_str())
        .append_pair("display_name", &identity.display_name)
        .append_pair("role", identity.role.as_str());
    Ok(url)
}

/// Drains the frame channel into the socket sink.
///
/// Exits when every sender handle is dropped or a write fails; not
/// registered with the session tasks so a graceful disconnect can flush
/// its queue.
async fn write_loop(mut ws_sender: WsSender, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(frame) = rx.recv().await {
        if let Err(err) = ws_sender.send(frame).await {
            tracing::debug!(error = %err, "socket write failed, writer exiting");
            break;
        }
    }
}

/// Reads frames for one session and applies them to shared state.
///
/// When the stream ends or errors while this epoch is still current, hands
/// off to the connection-loss path, which starts the reconnect supervisor.
async fn read_loop(inner: Arc<Inner>, epoch: u64, mut ws_reader: WsReader) {
    while let Some(frame) = ws_reader.next().await {
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        match frame {
            Ok(Message::Text(text)) => handle_envelope(&inner, epoch, text.as_str()),
            Ok(Message::Close(_)) => {
                tracing::info!("relay closed the connection");
                break;
            }
            Ok(_) => {
                // Binary, ping, and pong frames are not part of the protocol.
            }
            Err(err) => {
                tracing::warn!(error = %err, "WebSocket read error");
                break;
            }
        }
    }
    handle_connection_loss(&inner, epoch);
}

/// Applies one decoded envelope from the relay to the session state.
fn handle_envelope(inner: &Arc<Inner>, epoch: u64, text: &str) {
    let envelope = match codec::decode(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::warn!(error = %err, "undecodable frame from relay, skipping");
            return;
        }
    };

    match envelope {
        Envelope::Connect {
            room_key: Some(room_key),
            ..
        } => {
            {
                let mut state = inner.state.lock();
                if inner.epoch.load(Ordering::SeqCst) != epoch {
                    return;
                }
                state.room_key = Some(room_key.clone());
            }
            tracing::info!(room_key = %room_key, "relay acknowledged the session");
            emit(inner, ClientEvent::Connected { room_key });
        }
        Envelope::Connect { .. } => {
            tracing::debug!("connect envelope without a room key, ignoring");
        }
        Envelope::Message {
            message_id,
            display_name,
            text,
            timestamp,
            ..
        } => {
            let entry = {
                let mut state = inner.state.lock();
                if inner.epoch.load(Ordering::SeqCst) != epoch {
                    return;
                }
                let entry = ChatEntry {
                    id: message_id,
                    sender_name: display_name,
                    text,
                    timestamp,
                    is_from_self: false,
                    status: DeliveryState::Delivered,
                    room_key: state.room_key.clone(),
                };
                state.transcript.push(entry.clone());
                entry
            };
            emit(inner, ClientEvent::MessageReceived(entry));
        }
        Envelope::MessageAck { message_id, .. } => {
            let acked = inner.state.lock().transcript.mark_sent(message_id);
            if acked {
                emit(
                    inner,
                    ClientEvent::MessageStatusChanged {
                        message_id,
                        status: DeliveryState::Sent,
                    },
                );
            } else {
                tracing::debug!(message_id = %message_id, "ack for unknown or settled message");
            }
        }
        Envelope::PeerOnline { peer_id } => {
            tracing::info!(peer_id = %peer_id, "peer joined the room");
            emit(
                inner,
                ClientEvent::PeerStatusChanged {
                    peer_id,
                    online: true,
                },
            );
        }
        Envelope::PeerOffline { peer_id } => {
            tracing::info!(peer_id = %peer_id, "peer left the room");
            emit(
                inner,
                ClientEvent::PeerStatusChanged {
                    peer_id,
                    online: false,
                },
            );
        }
        Envelope::Error { error } => {
            tracing::warn!(error = %error, "relay reported an error");
            emit(inner, ClientEvent::Error { message: error });
        }
        Envelope::Heartbeat { .. } | Envelope::Disconnect { .. } => {
            tracing::debug!("client-bound stream carried a server-bound envelope, ignoring");
        }
    }
}

/// Reacts to an unexpected end of the socket stream.
///
/// Clears the dead session's writer and room, emits the disconnect events,
/// and spawns the reconnect supervisor under the same epoch. Does nothing
/// when the epoch is stale, which is how an explicit disconnect suppresses
/// automatic reconnection.
fn handle_connection_loss(inner: &Arc<Inner>, epoch: u64) {
    let stale: Vec<JoinHandle<()>>;
    {
        let mut state = inner.state.lock();
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        tracing::info!("connection to relay lost, starting reconnect");
        state.writer = None;
        state.room_key = None;
        emit(inner, ClientEvent::Disconnected);
        set_status(inner, &mut state, ConnectionStatus::Reconnecting);
        stale = state.tasks.drain(..).collect();
        state
            .tasks
            .push(tokio::spawn(reconnect_loop(Arc::clone(inner), epoch)));
    }
    // The drained handles include the caller's own reader task, which does
    // no further work after this call.
    for task in stale {
        task.abort();
    }
}

/// Retries the connection on a fixed interval until it sticks or the
/// budget runs out.
async fn reconnect_loop(inner: Arc<Inner>, epoch: u64) {
    let retry_interval = inner.config.reconnect.retry_interval;
    let max_attempts = inner.config.reconnect.max_attempts;

    for attempt in 1..=max_attempts {
        tokio::time::sleep(retry_interval).await;
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        emit(
            &inner,
            ClientEvent::Reconnecting {
                attempt,
                max_attempts,
            },
        );
        tracing::info!(attempt, max_attempts, "attempting to reconnect");

        match open_session(&inner, epoch).await {
            Ok(()) => {
                tracing::info!(attempt, "reconnected to relay");
                return;
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, "reconnect attempt failed");
            }
        }
    }

    {
        let mut state = inner.state.lock();
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        set_status(&inner, &mut state, ConnectionStatus::Error);
    }
    tracing::warn!(max_attempts, "reconnect budget exhausted, giving up");
    emit(
        &inner,
        ClientEvent::Error {
            message: format!("connection lost and not recovered after {max_attempts} attempts"),
        },
    );
}

/// Sends liveness beacons at the configured interval for one session.
async fn heartbeat_loop(inner: Arc<Inner>, epoch: u64, writer: mpsc::UnboundedSender<Message>) {
    let mut ticker = tokio::time::interval(inner.config.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The interval fires immediately; a fresh registration starts out
    // alive on the relay, so skip straight to the first full wait.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        send_frame(
            &writer,
            &Envelope::Heartbeat {
                timestamp: Timestamp::now(),
            },
        );
    }
}

/// Records a send attempted without a session as an immediately failed
/// entry. Called with the state lock held.
fn record_failed_send(inner: &Inner, state: &mut ClientState, text: &str) -> MessageId {
    let message_id = MessageId::new();
    let sender_name = state
        .identity
        .as_ref()
        .map(|identity| identity.display_name.clone())
        .unwrap_or_default();
    state.transcript.push(ChatEntry {
        id: message_id,
        sender_name,
        text: text.to_owned(),
        timestamp: Timestamp::now(),
        is_from_self: true,
        status: DeliveryState::Failed,
        room_key: state.room_key.clone(),
    });
    emit(
        inner,
        ClientEvent::MessageStatusChanged {
            message_id,
            status: DeliveryState::Failed,
        },
    );
    message_id
}

/// Moves a `Sending` entry to `Failed` after a hand-off failure.
fn mark_send_failed(inner: &Inner, message_id: MessageId) {
    let failed = inner.state.lock().transcript.mark_failed(message_id);
    if failed {
        emit(
            inner,
            ClientEvent::MessageStatusChanged {
                message_id,
                status: DeliveryState::Failed,
            },
        );
    }
}

/// Records a status transition and notifies the application.
fn set_status(inner: &Inner, state: &mut ClientState, status: ConnectionStatus) {
    if state.status == status {
        return;
    }
    tracing::debug!(from = %state.status, to = %status, "connection status changed");
    state.status = status;
    emit(inner, ClientEvent::StatusChanged(status));
}

/// Encodes an envelope and queues it on a writer channel.
///
/// Returns `false` when the frame could not be queued, either because the
/// envelope failed to encode or the writer task is gone.
fn send_frame(writer: &mpsc::UnboundedSender<Message>, envelope: &Envelope) -> bool {
    match codec::encode(envelope) {
        Ok(text) => writer.send(Message::Text(text.into())).is_ok(),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode outbound envelope");
            false
        }
    }
}

/// Non-blocking event emission; a full or closed channel drops the event.
fn emit(inner: &Inner, event: ClientEvent) {
    if inner.event_tx.try_send(event).is_err() {
        tracing::debug!("event channel full or closed, dropping event");
    }
}
