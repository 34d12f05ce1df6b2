//! In-memory consultation transcript with delivery status tracking.
//!
//! Every message the client sends or receives becomes a [`ChatEntry`] in a
//! [`Transcript`]. Outbound entries walk a small status machine:
//!
//! - `Sending -> Sent` when the relay acknowledges receipt
//! - `Sending -> Failed` when the send cannot be handed to the socket
//! - `Failed -> Sending` when the user retries, with a fresh message ID
//!
//! Inbound entries are stored as `Delivered` and never change. Transitions
//! outside this machine are ignored rather than treated as errors, because
//! a late ack for an already-failed message is normal relay behavior, not a
//! bug in the caller.

use careline_proto::envelope::{MessageId, Timestamp};
use careline_proto::identity::RoomKey;

/// Delivery status of a single transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Handed to the socket writer, no ack yet.
    Sending,
    /// The relay acknowledged receipt.
    Sent,
    /// Received from the peer or the relay.
    Delivered,
    /// The send failed; the entry is eligible for retry.
    Failed,
}

impl DeliveryState {
    /// Lowercase label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in the consultation transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    /// Protocol-level message ID. Replaced when a failed entry is retried.
    pub id: MessageId,
    /// Display name of the sender.
    pub sender_name: String,
    /// Message body.
    pub text: String,
    /// When the message was composed (or re-composed, for retries).
    pub timestamp: Timestamp,
    /// Whether this client authored the message.
    pub is_from_self: bool,
    /// Current delivery status.
    pub status: DeliveryState,
    /// Room the message belongs to, once known.
    pub room_key: Option<RoomKey>,
}

/// Ordered collection of [`ChatEntry`] values for one consultation.
///
/// Entries stay in insertion order; a retry updates its entry in place so
/// the conversation does not visually reorder.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<ChatEntry>,
}

impl Transcript {
    /// Creates an empty transcript.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends an entry to the end of the transcript.
    pub fn push(&mut self, entry: ChatEntry) {
        self.entries.push(entry);
    }

    /// Marks a `Sending` entry as `Sent`.
    ///
    /// Returns `false` when no entry has this ID or the entry is not in
    /// `Sending`. A late ack for a failed or already-acked message lands
    /// here and is deliberately a no-op.
    pub fn mark_sent(&mut self, id: MessageId) -> bool {
        match self.entry_mut(id) {
            Some(entry) if entry.status == DeliveryState::Sending => {
                entry.status = DeliveryState::Sent;
                true
            }
            _ => false,
        }
    }

    /// Marks a `Sending` entry as `Failed`.
    ///
    /// Returns `false` for unknown IDs and for entries outside `Sending`;
    /// an acked message never regresses to failed.
    pub fn mark_failed(&mut self, id: MessageId) -> bool {
        match self.entry_mut(id) {
            Some(entry) if entry.status == DeliveryState::Sending => {
                entry.status = DeliveryState::Failed;
                true
            }
            _ => false,
        }
    }

    /// Puts a `Failed` entry back into `Sending` for another attempt.
    ///
    /// The entry keeps its position in the transcript but gets a fresh
    /// message ID and timestamp, so the relay treats the resend as a new
    /// message. Returns a copy of the refreshed entry, or `None` when the
    /// ID is unknown or the entry is not in `Failed`.
    pub fn begin_retry(&mut self, id: MessageId) -> Option<ChatEntry> {
        let entry = self.entry_mut(id)?;
        if entry.status != DeliveryState::Failed {
            return None;
        }
        entry.id = MessageId::new();
        entry.timestamp = Timestamp::now();
        entry.status = DeliveryState::Sending;
        Some(entry.clone())
    }

    /// Looks up an entry by message ID.
    #[must_use]
    pub fn entry(&self, id: MessageId) -> Option<&ChatEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// All entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the transcript holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, id: MessageId) -> Option<&mut ChatEntry> {
        self.entries.iter_mut().find(|entry| entry.id == id)
    }
}
