//! Consultation room directory for the relay.
//!
//! A room is the exclusive pairing of one patient connection and one doctor
//! connection, keyed by the deterministic pair key. Every seat mutation goes
//! through this type, so concurrent connects and disconnects from both
//! participants serialize on one lock. A seat holds at most one occupant; a
//! new connection for the same role supersedes the previous one, and the
//! room record is dropped as soon as both seats are empty.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::RwLock;

use careline_proto::identity::{ParticipantId, Role, RoomKey};

use crate::registry::ConnectionId;

/// The connection currently holding one role's seat in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupant {
    /// Socket that owns the seat.
    pub connection_id: ConnectionId,
    /// The participant seated here.
    pub participant_id: ParticipantId,
    /// Display name shown to the peer.
    pub display_name: String,
}

/// One patient-doctor pairing with a seat per role.
#[derive(Debug)]
struct Room {
    patient: Option<Occupant>,
    doctor: Option<Occupant>,
    created_at: Instant,
}

impl Room {
    fn new() -> Self {
        Self {
            patient: None,
            doctor: None,
            created_at: Instant::now(),
        }
    }

    const fn seat(&self, role: Role) -> &Option<Occupant> {
        match role {
            Role::Patient => &self.patient,
            Role::Doctor => &self.doctor,
        }
    }

    const fn seat_mut(&mut self, role: Role) -> &mut Option<Occupant> {
        match role {
            Role::Patient => &mut self.patient,
            Role::Doctor => &mut self.doctor,
        }
    }

    const fn is_empty(&self) -> bool {
        self.patient.is_none() && self.doctor.is_none()
    }
}

/// Directory of active consultation rooms keyed by pair.
pub struct RoomDirectory {
    rooms: RwLock<HashMap<RoomKey, Room>>,
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Seats an occupant in its role's seat, creating the room on first use.
    ///
    /// Returns the displaced occupant when the seat was already taken. The
    /// displaced connection keeps its socket; it just no longer receives
    /// relay traffic for this room.
    pub async fn occupy(
        &self,
        room_key: &RoomKey,
        role: Role,
        occupant: Occupant,
    ) -> Option<Occupant> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(room_key.clone()).or_insert_with(Room::new);
        room.seat_mut(role).replace(occupant)
    }

    /// Returns the occupant seated on the other side of the room.
    pub async fn peer_of(&self, room_key: &RoomKey, role: Role) -> Option<Occupant> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_key)
            .and_then(|room| room.seat(role.other()).clone())
    }

    /// Clears the role's seat when still held by `connection_id`, returning
    /// the vacated occupant. Deletes the room once both seats are empty.
    ///
    /// A stale connection id leaves the seat untouched, so a superseded
    /// worker cannot unseat its successor during teardown.
    pub async fn vacate(
        &self,
        room_key: &RoomKey,
        role: Role,
        connection_id: ConnectionId,
    ) -> Option<Occupant> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_key)?;
        let seat = room.seat_mut(role);
        let vacated = if seat
            .as_ref()
            .is_some_and(|occupant| occupant.connection_id == connection_id)
        {
            seat.take()
        } else {
            None
        };
        if room.is_empty() {
            let age = room.created_at.elapsed();
            rooms.remove(room_key);
            tracing::debug!(room = %room_key, age_secs = age.as_secs(), "both seats empty, room removed");
        }
        vacated
    }

    /// Whether a room currently exists for the key.
    pub async fn contains(&self, room_key: &RoomKey) -> bool {
        self.rooms.read().await.contains_key(room_key)
    }

    /// Number of active rooms.
    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Whether no rooms are active.
    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}
