//! # vcall session core
//!
//! Call-session signaling and negotiation engine. It owns the lifecycle of
//! a call (offer, ring, accept or reject, connect, hang up, close) for one
//! local participant, and talks to the outside world through two seams:
//!
//! - a [`SignalChannel`] that carries [`SignalMessage`]s to and from peers
//! - a [`MediaProvider`] that is attached to and detached from sessions
//!
//! Subscribers observe [`SessionEvent`]s through [`SignalingEngine::subscribe`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vcall_session_core::prelude::*;
//!
//! # async fn run() -> Result<()> {
//! let hub = MemorySignalHub::new();
//! let engine = SignalingEngine::builder()
//!     .with_local_participant("alice")
//!     .with_channel(Arc::new(hub.connect("alice")))
//!     .build()?;
//! engine.start().await?;
//!
//! let mut events = engine.subscribe();
//! let session_id = engine.initiate(["bob"], MediaKind::AudioVideo, None).await?;
//! while let Ok(event) = events.receive().await {
//!     if let SessionEvent::SessionClosed { .. } = event {
//!         break;
//!     }
//! }
//! # let _ = session_id;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod errors;
pub mod events;
pub mod logging;
pub mod media;
pub mod session;
pub mod signaling;
pub mod types;

pub use config::EngineConfig;
pub use coordinator::{EngineStats, RegistryStats, SessionRegistry, SignalingEngine, SignalingEngineBuilder};
pub use errors::{Result, SessionError};
pub use events::{EventBus, EventSubscriber, SessionEvent};
pub use media::{MediaConfig, MediaProvider, NoopMediaProvider};
pub use session::CallSession;
pub use signaling::{IceCandidate, MemorySignalChannel, MemorySignalHub, SignalChannel, SignalKind, SignalMessage};
pub use types::{
    CallState, CloseReason, MediaKind, PeerConnectionState, ParticipantId, SessionId, SessionRole, TrackKind, UserInfo,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything an application embedding the engine usually needs
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::coordinator::{EngineStats, SignalingEngine};
    pub use crate::errors::{Result, SessionError};
    pub use crate::events::{EventSubscriber, SessionEvent};
    pub use crate::logging::{setup_logging, LoggingConfig};
    pub use crate::media::{MediaConfig, MediaProvider};
    pub use crate::session::CallSession;
    pub use crate::signaling::{IceCandidate, MemorySignalHub, SignalChannel, SignalMessage};
    pub use crate::types::{
        CallState, CloseReason, MediaKind, PeerConnectionState, ParticipantId, SessionId, TrackKind, UserInfo,
    };
}
