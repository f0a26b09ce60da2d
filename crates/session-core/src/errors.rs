//! Error Types for Session Core
//!
//! One error enum covers local command failures (returned synchronously to the
//! caller) and inbound-message anomalies (recorded, then the message is discarded).

use crate::types::{CallState, ParticipantId, SessionId};

/// Main result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Main error type for session operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// The local participant already owns a non-terminal session
    #[error("Participant {participant_id} is already in call {session_id}")]
    AlreadyInCall {
        participant_id: ParticipantId,
        session_id: SessionId,
    },

    /// A local command referenced a session that is absent or already terminal
    #[error("No such session: {session_id}")]
    NoSuchSession { session_id: SessionId },

    /// An inbound message referenced a session this engine does not know (or no longer knows)
    #[error("Unknown session: {session_id}")]
    UnknownSession { session_id: SessionId },

    /// A session with this id is already registered, or was registered before
    #[error("Duplicate session: {session_id}")]
    DuplicateSession { session_id: SessionId },

    /// The signal channel failed to deliver a message; the caller may retry
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// A local command lost the race against the answer timer; the session failed
    /// while the command waited for it. Observers see `CloseReason::Timeout` instead.
    #[error("Session {session_id} timed out waiting for an answer")]
    Timeout { session_id: SessionId },

    /// The session exists but its current state does not accept the operation
    #[error("Cannot {operation} session {session_id} in state {state:?}")]
    InvalidState {
        session_id: SessionId,
        state: CallState,
        operation: String,
    },

    /// The sender of an inbound message is not part of the session
    #[error("Participant {participant_id} is not part of session {session_id}")]
    UnknownParticipant {
        session_id: SessionId,
        participant_id: ParticipantId,
    },

    /// An inbound message failed validation
    #[error("Invalid signaling message: {reason}")]
    InvalidMessage { reason: String },

    /// The opponent set given to `initiate` is unusable
    #[error("Invalid participants: {reason}")]
    InvalidParticipants { reason: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Wire encoding or decoding failed
    #[error("Codec error: {message}")]
    Codec { message: String },

    /// The media provider rejected a request
    #[error("Media error: {message}")]
    Media { message: String },

    /// An event subscriber lagged behind or the bus was closed
    #[error("Event stream error: {message}")]
    EventStream { message: String },
}

impl SessionError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec { message: message.into() }
    }

    pub fn media(message: impl Into<String>) -> Self {
        Self::Media { message: message.into() }
    }

    pub fn invalid_message(reason: impl Into<String>) -> Self {
        Self::InvalidMessage { reason: reason.into() }
    }

    pub fn invalid_participants(reason: impl Into<String>) -> Self {
        Self::InvalidParticipants { reason: reason.into() }
    }

    pub fn event_stream(message: impl Into<String>) -> Self {
        Self::EventStream { message: message.into() }
    }

    pub fn invalid_state(session_id: &SessionId, state: CallState, operation: &str) -> Self {
        Self::InvalidState {
            session_id: session_id.clone(),
            state,
            operation: operation.to_string(),
        }
    }

    /// Only transport failures leave the session untouched so the same call can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Inbound anomalies that are logged and dropped without affecting any session.
    pub fn is_anomaly(&self) -> bool {
        matches!(
            self,
            Self::UnknownSession { .. }
                | Self::UnknownParticipant { .. }
                | Self::InvalidMessage { .. }
                | Self::DuplicateSession { .. }
        )
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::codec(err.to_string())
    }
}

impl From<toml::de::Error> for SessionError {
    fn from(err: toml::de::Error) -> Self {
        SessionError::config(err.to_string())
    }
}
