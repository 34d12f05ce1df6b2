//! Live-connection registry for the relay.
//!
//! Tracks one entry per participant, mapping identity to the channel that
//! feeds the socket's writer task. A reconnect replaces the entry; the
//! superseded socket stays open but unreachable until the liveness sweep or
//! its own close reaps it. All removals are checked against the connection
//! id so a superseded worker can never evict its successor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use tokio::sync::{RwLock, mpsc};

use careline_proto::identity::{ParticipantId, Role, RoomKey};

/// Process-unique identifier for one accepted socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Issues the next connection identifier.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Server-side record of one live socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Identifier of the socket this record belongs to.
    pub connection_id: ConnectionId,
    /// The participant behind the socket.
    pub participant_id: ParticipantId,
    /// Validated role claim from the handshake.
    pub role: Role,
    /// Room the connection is seated in.
    pub room_key: RoomKey,
    /// Display name announced at connect time.
    pub display_name: String,
    /// Channel feeding the socket's writer task.
    pub sender: mpsc::UnboundedSender<Message>,
    /// Set by heartbeats, consumed and re-armed by the sweep.
    alive: bool,
}

impl ConnectionHandle {
    /// Creates a handle for a freshly accepted connection, initially alive.
    #[must_use]
    pub const fn new(
        connection_id: ConnectionId,
        participant_id: ParticipantId,
        role: Role,
        room_key: RoomKey,
        display_name: String,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            connection_id,
            participant_id,
            role,
            room_key,
            display_name,
            sender,
            alive: true,
        }
    }
}

/// Registry of live connections keyed by participant identity.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ParticipantId, ConnectionHandle>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a connection, returning the displaced handle when the
    /// participant was already connected.
    ///
    /// The displaced socket is not closed here; it simply stops being
    /// reachable through the registry.
    pub async fn insert(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let mut conns = self.connections.write().await;
        conns.insert(handle.participant_id.clone(), handle)
    }

    /// Removes the participant's entry when it still belongs to
    /// `connection_id`, returning the removed handle.
    pub async fn remove(
        &self,
        participant_id: &ParticipantId,
        connection_id: ConnectionId,
    ) -> Option<ConnectionHandle> {
        let mut conns = self.connections.write().await;
        if conns
            .get(participant_id)
            .is_some_and(|handle| handle.connection_id == connection_id)
        {
            return conns.remove(participant_id);
        }
        None
    }

    /// Returns the delivery channel for the participant when the registered
    /// entry still belongs to `connection_id`.
    pub async fn sender_for(
        &self,
        participant_id: &ParticipantId,
        connection_id: ConnectionId,
    ) -> Option<mpsc::UnboundedSender<Message>> {
        let conns = self.connections.read().await;
        conns
            .get(participant_id)
            .filter(|handle| handle.connection_id == connection_id)
            .map(|handle| handle.sender.clone())
    }

    /// Marks the connection alive for the current sweep window.
    ///
    /// Returns `false` when the entry is gone or belongs to a newer
    /// connection, in which case the heartbeat is ignored.
    pub async fn mark_alive(
        &self,
        participant_id: &ParticipantId,
        connection_id: ConnectionId,
    ) -> bool {
        let mut conns = self.connections.write().await;
        match conns.get_mut(participant_id) {
            Some(handle) if handle.connection_id == connection_id => {
                handle.alive = true;
                true
            }
            _ => false,
        }
    }

    /// Removes every connection that did not heartbeat since the previous
    /// sweep and re-arms the survivors as not-alive.
    ///
    /// Returns the reaped handles so the caller can close their sockets and
    /// vacate their room seats.
    pub async fn sweep(&self) -> Vec<ConnectionHandle> {
        let mut conns = self.connections.write().await;
        let mut reaped = Vec::new();
        conns.retain(|_, handle| {
            if handle.alive {
                handle.alive = false;
                true
            } else {
                reaped.push(handle.clone());
                false
            }
        });
        reaped
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether the registry has no connections.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
