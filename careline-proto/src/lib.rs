//! Shared protocol definitions for the Careline chat relay wire format.

pub mod codec;
pub mod envelope;
pub mod identity;
