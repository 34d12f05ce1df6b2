//! Participant identity types shared by the relay and the client.
//!
//! Identity is established by the platform's identity service before a
//! connection is admitted; this module only carries it across the wire.

use serde::{Deserialize, Serialize};

/// Reserved participant ID used as the author of relay-synthesized notices.
const SYSTEM_PARTICIPANT_ID: &str = "system";

/// Display name attached to relay-synthesized notices.
pub const SYSTEM_DISPLAY_NAME: &str = "System";

/// Opaque identifier for a chat participant, issued by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Creates a participant identifier from an identity-service string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the reserved identity that authors relay-synthesized notices.
    #[must_use]
    pub fn system() -> Self {
        Self(SYSTEM_PARTICIPANT_ID.to_owned())
    }

    /// Returns `true` for the reserved system identity.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_PARTICIPANT_ID
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of a consultation a participant occupies.
///
/// The role is an explicit claim supplied by the identity layer at connect
/// time; the relay validates it before room assignment and never infers it
/// from the shape of the participant ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The patient side of the consultation.
    Patient,
    /// The doctor side of the consultation.
    Doctor,
}

impl Role {
    /// Returns the lowercase wire spelling of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Doctor => "doctor",
        }
    }

    /// Returns the opposite side of the consultation.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Patient => Self::Doctor,
            Self::Doctor => Self::Patient,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role string is not a recognized claim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized role claim: {0:?}")]
pub struct ParseRoleError(pub String);

impl std::str::FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Self::Patient),
            "doctor" => Ok(Self::Doctor),
            other => Err(ParseRoleError(other.to_owned())),
        }
    }
}

/// Key identifying the exclusive room for one (patient, doctor) pair.
///
/// Derived from the pair of participant IDs, not from connection order, so
/// both sides resolve the same room no matter who connects first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomKey(String);

impl RoomKey {
    /// Derives the room key for a participant pair.
    ///
    /// The key is the lexicographically ordered pair joined by `:`, with
    /// `\` and `:` escaped inside each ID so the encoding is injective:
    /// `for_pair(a, b)` and `for_pair(b, a)` are identical, and distinct
    /// pairs never share a key even when an ID contains the delimiter.
    #[must_use]
    pub fn for_pair(a: &ParticipantId, b: &ParticipantId) -> Self {
        let (first, second) = if a.as_str() <= b.as_str() {
            (a, b)
        } else {
            (b, a)
        };
        Self(format!(
            "{}:{}",
            escape_id(first.as_str()),
            escape_id(second.as_str())
        ))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Escapes the room-key delimiter and the escape character inside one ID.
fn escape_id(id: &str) -> String {
    id.replace('\\', "\\\\").replace(':', "\\:")
}

/// A participant's connect-time identity, immutable for the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Identifier issued by the identity service.
    pub participant_id: ParticipantId,
    /// Explicit role claim, validated server-side.
    pub role: Role,
    /// Human-readable name shown to the peer.
    pub display_name: String,
}

impl Identity {
    /// Bundles the fields supplied by the identity layer at connect time.
    #[must_use]
    pub fn new(participant_id: ParticipantId, role: Role, display_name: impl Into<String>) -> Self {
        Self {
            participant_id,
            role,
            display_name: display_name.into(),
        }
    }
}
