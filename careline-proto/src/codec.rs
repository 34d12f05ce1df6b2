//! Serialization and deserialization for the Careline wire protocol.
//!
//! Envelopes travel as JSON text frames. Decoding distinguishes wire
//! garbage from well-formed JSON carrying an unrecognized envelope type,
//! because the dispatcher answers the former with an `error` envelope and
//! silently drops the latter.

use crate::envelope::Envelope;

/// Envelope tags this protocol revision understands.
const KNOWN_TYPES: [&str; 8] = [
    "connect",
    "message",
    "message_ack",
    "heartbeat",
    "peer_online",
    "peer_offline",
    "disconnect",
    "error",
];

/// Error returned when an envelope cannot be serialized.
#[derive(Debug, thiserror::Error)]
#[error("envelope serialization failed: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Error returned when an inbound frame cannot be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame is not valid JSON, or a known envelope type carries an
    /// ill-formed payload.
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The frame is valid JSON but its `type` tag is not part of the protocol.
    #[error("unknown envelope type {found:?}")]
    UnknownType {
        /// The unrecognized tag, or a placeholder when the tag is missing.
        found: String,
    },
}

/// Encodes an [`Envelope`] into a JSON string for a text frame.
///
/// # Errors
///
/// Returns [`EncodeError`] if the envelope cannot be serialized.
pub fn encode(envelope: &Envelope) -> Result<String, EncodeError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decodes a JSON text frame into an [`Envelope`].
///
/// # Errors
///
/// Returns [`DecodeError::UnknownType`] when the frame is valid JSON whose
/// `type` tag is outside the protocol, and [`DecodeError::Malformed`] for
/// everything else (invalid JSON, missing tag, or a known type with an
/// ill-formed payload).
pub fn decode(text: &str) -> Result<Envelope, DecodeError> {
    let err = match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) => return Ok(envelope),
        Err(err) => err,
    };
    // Re-probe as untyped JSON to tell an unrecognized tag apart from
    // wire garbage.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text)
        && let Some(tag) = value.get("type").and_then(serde_json::Value::as_str)
        && !KNOWN_TYPES.contains(&tag)
    {
        return Err(DecodeError::UnknownType {
            found: tag.to_owned(),
        });
    }
    Err(DecodeError::Malformed(err))
}
