//! Careline client: connection manager for patient and doctor apps.
//!
//! Wraps one WebSocket session to the relay behind [`manager::ChatClient`],
//! tracking the conversation in [`transcript::Transcript`] and surfacing
//! lifecycle changes as [`events::ClientEvent`] values.

pub mod config;
pub mod events;
pub mod manager;
pub mod transcript;
