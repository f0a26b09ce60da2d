//! Signaling engine and session registry
//!
//! The engine interprets inbound signaling, drives session transitions and
//! emits outbound messages; the registry owns the sessions themselves.

mod builder;
mod engine;
mod inbound;
pub mod registry;

pub use builder::SignalingEngineBuilder;
pub use engine::{EngineStats, SignalingEngine};
pub use registry::{RegistryStats, SessionHandle, SessionRegistry};
