//! Wire envelope types for the Careline chat relay.
//!
//! Every frame exchanged between client and relay is one [`Envelope`],
//! serialized as JSON with a `type` tag and a `data` payload. No untyped
//! payload ever crosses the wire.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{Identity, ParticipantId, RoomKey, SYSTEM_DISPLAY_NAME};

/// Maximum allowed chat text length in bytes (8 KiB).
pub const MAX_TEXT_LEN: usize = 8 * 1024;

/// Unique identifier for a message, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new time-ordered message identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `MessageId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Receipt status carried by a `message_ack` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    /// The relay accepted the message for delivery.
    Received,
}

impl std::fmt::Display for AckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Received => f.write_str("received"),
        }
    }
}

/// Error returned when outbound chat text fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Chat text is empty.
    #[error("message text is empty")]
    Empty,
    /// Chat text exceeds the maximum allowed length.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual length of the text in bytes.
        size: usize,
        /// Maximum allowed length in bytes.
        max: usize,
    },
}

/// Validates chat text against the default length cap ([`MAX_TEXT_LEN`]).
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] for empty text, or
/// [`ValidationError::TooLarge`] when the text exceeds the cap.
pub const fn validate_text(text: &str) -> Result<(), ValidationError> {
    validate_text_with(text, MAX_TEXT_LEN)
}

/// Validates chat text against a caller-supplied length cap.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] for empty text, or
/// [`ValidationError::TooLarge`] when the text exceeds `max`.
pub const fn validate_text_with(text: &str, max: usize) -> Result<(), ValidationError> {
    if text.is_empty() {
        return Err(ValidationError::Empty);
    }
    let size = text.len();
    if size > max {
        return Err(ValidationError::TooLarge { size, max });
    }
    Ok(())
}

/// Top-level envelope wrapping every frame on the wire.
///
/// Serializes to `{"type": <tag>, "data": {...}}` with snake_case tags, so
/// the dispatcher's handling of each type is a compile-checked match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Envelope {
    /// Identity announcement after open (client to server) or handshake
    /// acknowledgment carrying the room key (server to client).
    Connect {
        /// Announced identity; absent in the server acknowledgment.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant_id: Option<ParticipantId>,
        /// Announced display name; absent in the server acknowledgment.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        /// Assigned room key; present only in the server acknowledgment.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_key: Option<RoomKey>,
    },
    /// A chat message; relayed copies carry a fresh server-assigned ID and
    /// timestamp with the original text and sender identity.
    Message {
        /// Sender-assigned ID inbound, server-assigned ID on the relayed copy.
        message_id: MessageId,
        /// Who authored the text.
        participant_id: ParticipantId,
        /// Author's display name as shown to the recipient.
        display_name: String,
        /// The chat text itself.
        text: String,
        /// Creation time of this copy of the message.
        timestamp: Timestamp,
    },
    /// Relay receipt confirmation for a message accepted from the sender.
    MessageAck {
        /// The sender-assigned ID being confirmed.
        message_id: MessageId,
        /// Receipt status.
        status: AckStatus,
    },
    /// Client liveness beacon consumed by the relay's sweep bookkeeping.
    Heartbeat {
        /// When the beacon was emitted.
        timestamp: Timestamp,
    },
    /// The peer's slot in the shared room became occupied.
    PeerOnline {
        /// The participant that came online.
        peer_id: ParticipantId,
    },
    /// The peer's slot in the shared room was cleared.
    PeerOffline {
        /// The participant that went offline.
        peer_id: ParticipantId,
    },
    /// Graceful leave announcement (client to server).
    Disconnect {
        /// The departing participant, when the client identifies itself.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant_id: Option<ParticipantId>,
    },
    /// Relay-reported protocol or delivery failure.
    Error {
        /// Human-readable description of the failure.
        error: String,
    },
}

impl Envelope {
    /// Builds the client's post-open identity announcement.
    #[must_use]
    pub fn connect_announce(identity: &Identity) -> Self {
        Self::Connect {
            participant_id: Some(identity.participant_id.clone()),
            display_name: Some(identity.display_name.clone()),
            room_key: None,
        }
    }

    /// Builds the server's handshake acknowledgment carrying the room key.
    #[must_use]
    pub const fn connect_ack(room_key: RoomKey) -> Self {
        Self::Connect {
            participant_id: None,
            display_name: None,
            room_key: Some(room_key),
        }
    }

    /// Builds a relay-authored notice delivered as a system chat line.
    #[must_use]
    pub fn system_notice(text: impl Into<String>) -> Self {
        Self::Message {
            message_id: MessageId::new(),
            participant_id: ParticipantId::system(),
            display_name: SYSTEM_DISPLAY_NAME.to_owned(),
            text: text.into(),
            timestamp: Timestamp::now(),
        }
    }

    /// Returns the wire tag for this envelope, as used in the `type` field.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Message { .. } => "message",
            Self::MessageAck { .. } => "message_ack",
            Self::Heartbeat { .. } => "heartbeat",
            Self::PeerOnline { .. } => "peer_online",
            Self::PeerOffline { .. } => "peer_offline",
            Self::Disconnect { .. } => "disconnect",
            Self::Error { .. } => "error",
        }
    }
}
