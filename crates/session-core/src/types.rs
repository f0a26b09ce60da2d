//! Core types for session-core
//!
//! Identifiers, media kinds and the call state enumeration shared by every
//! other module.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Free-form string map carried alongside signaling commands
pub type UserInfo = HashMap<String, String>;

/// Opaque identifier for a user taking part in calls
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self(String::new())
    }
}

/// Session ID type, the correlation key for every signaling message
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(format!("session-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Media carried by a session, fixed for its lifetime
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    AudioOnly,
    AudioVideo,
}

impl MediaKind {
    pub fn allows(&self, track: TrackKind) -> bool {
        match track {
            TrackKind::Audio => true,
            TrackKind::Video => *self == MediaKind::AudioVideo,
        }
    }
}

/// Kind of a remote media track reported by the media engine
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Which side of the call the local participant is on
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum SessionRole {
    /// Created the session via `initiate`
    Initiator,
    /// Received the session through an inbound Offer
    Callee,
}

/// Lifecycle state of a call session
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CallState {
    Created,
    Ringing,
    Connecting,
    Active,
    Ending,
    Closed,
    Rejected,
    Failed,
}

impl CallState {
    /// No transition is defined out of a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Closed | CallState::Rejected | CallState::Failed)
    }

    /// States guarded by the answer timer
    pub fn is_awaiting_answer(&self) -> bool {
        matches!(self, CallState::Ringing | CallState::Connecting)
    }

    /// Whether a session in this state still accepts commands and messages
    pub fn is_live(&self) -> bool {
        !self.is_terminal() && *self != CallState::Ending
    }

    pub fn valid_next_states(&self) -> &'static [CallState] {
        use CallState::*;
        match self {
            Created => &[Ringing, Connecting],
            Ringing => &[Connecting, Rejected, Failed, Ending],
            Connecting => &[Active, Rejected, Failed, Ending],
            Active => &[Ending],
            Ending => &[Closed],
            Closed | Rejected | Failed => &[],
        }
    }

    pub fn can_transition_to(&self, next: CallState) -> bool {
        self.valid_next_states().contains(&next)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Why a session left the live states
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloseReason {
    /// A participant hung up; `by` may be the local participant
    HangUp { by: ParticipantId },
    /// A participant declined the call
    Rejected { by: ParticipantId },
    /// Every remote participant left or declined
    AllParticipantsLeft,
    /// No answer within the configured answer timeout
    Timeout,
    /// The engine was shut down
    Shutdown,
}

/// Connection state of the media path towards one participant
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}
