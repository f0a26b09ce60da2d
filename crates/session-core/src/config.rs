//! Engine configuration
//!
//! Everything the engine needs is passed in through [`EngineConfig`] at
//! construction time; there is no process-global state.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SessionError};
use crate::media::MediaConfig;
use crate::types::ParticipantId;

pub const DEFAULT_ANSWER_TIMEOUT_MS: u64 = 45_000;
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;
pub const DEFAULT_INBOUND_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_RETIRED_SESSION_CAPACITY: usize = 4096;

/// Configuration for a [`SignalingEngine`](crate::SignalingEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Participant this engine acts for
    pub local_participant: ParticipantId,
    /// How long a session may stay Ringing/Connecting without an answer
    pub answer_timeout_ms: u64,
    pub event_capacity: usize,
    /// Per-session inbound queue depth
    pub inbound_queue_capacity: usize,
    /// Closed session ids remembered to refuse resurrection
    pub retired_session_capacity: usize,
    /// Answer an Offer with a busy Reject while already in a call
    pub reject_when_busy: bool,
    pub media: MediaConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            local_participant: ParticipantId::default(),
            answer_timeout_ms: DEFAULT_ANSWER_TIMEOUT_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            inbound_queue_capacity: DEFAULT_INBOUND_QUEUE_CAPACITY,
            retired_session_capacity: DEFAULT_RETIRED_SESSION_CAPACITY,
            reject_when_busy: true,
            media: MediaConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(local_participant: impl Into<ParticipantId>) -> Self {
        Self {
            local_participant: local_participant.into(),
            ..Default::default()
        }
    }

    pub fn with_answer_timeout(mut self, timeout: Duration) -> Self {
        self.answer_timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn answer_timeout(&self) -> Duration {
        Duration::from_millis(self.answer_timeout_ms)
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SessionError::config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.local_participant.is_empty() {
            return Err(SessionError::config("local_participant must be set"));
        }
        if self.answer_timeout_ms == 0 {
            return Err(SessionError::config("answer_timeout_ms must be greater than zero"));
        }
        if self.event_capacity == 0 || self.inbound_queue_capacity == 0 {
            return Err(SessionError::config("queue capacities must be greater than zero"));
        }
        if self.retired_session_capacity == 0 {
            return Err(SessionError::config("retired_session_capacity must be greater than zero"));
        }
        self.media.validate()
    }
}
