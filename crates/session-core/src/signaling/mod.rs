//! Signaling messages and the transport they travel over

pub mod channel;
pub mod message;

pub use channel::{MemorySignalChannel, MemorySignalHub, SignalChannel};
pub use message::{IceCandidate, SignalKind, SignalMessage, SignalPayload};
