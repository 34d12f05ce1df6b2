//! Careline relay server: registers patient and doctor connections, pairs
//! them into exclusive consultation rooms, and relays chat messages between
//! exactly those two parties.

pub mod config;
pub mod registry;
pub mod relay;
pub mod rooms;
