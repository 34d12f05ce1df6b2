//! Events and connection states surfaced to the embedding application.
//!
//! The [`ChatClient`](crate::manager::ChatClient) never calls back into app
//! code. Everything it wants the UI to know arrives on the bounded event
//! channel returned by the constructor. Sends never block: when the app
//! stops draining the channel, new events are dropped.

use careline_proto::envelope::MessageId;
use careline_proto::identity::{ParticipantId, RoomKey};

use crate::transcript::{ChatEntry, DeliveryState};

/// Connection lifecycle state of a [`ChatClient`](crate::manager::ChatClient).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Not connected and not trying to be.
    #[default]
    Disconnected,
    /// An explicit `connect` call is in flight.
    Connecting,
    /// The WebSocket session is open.
    Connected,
    /// The connection dropped unexpectedly and automatic recovery is running.
    Reconnecting,
    /// The retry budget is exhausted; only an explicit `connect` leaves this.
    Error,
}

impl ConnectionStatus {
    /// Lowercase label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the [`ChatClient`](crate::manager::ChatClient) for UI
/// notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The connection lifecycle state changed.
    StatusChanged(ConnectionStatus),
    /// The relay acknowledged the session and assigned the consultation room.
    Connected {
        /// Room the relay paired this client into.
        room_key: RoomKey,
    },
    /// The connection to the relay was lost.
    Disconnected,
    /// An automatic reconnect attempt is about to run.
    Reconnecting {
        /// One-based attempt number.
        attempt: u32,
        /// Size of the retry budget.
        max_attempts: u32,
    },
    /// A chat message arrived from the peer or from the relay itself.
    MessageReceived(ChatEntry),
    /// A transcript entry's delivery status changed.
    MessageStatusChanged {
        /// The message whose status changed.
        message_id: MessageId,
        /// The new status.
        status: DeliveryState,
    },
    /// The peer joined or left the consultation room.
    PeerStatusChanged {
        /// The peer in question.
        peer_id: ParticipantId,
        /// Whether the peer is currently connected.
        online: bool,
    },
    /// The relay reported an error, or the client gave up reconnecting.
    Error {
        /// Human-readable description.
        message: String,
    },
}
