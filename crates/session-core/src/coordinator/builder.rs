//! Builder for [`SignalingEngine`]

use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::coordinator::engine::SignalingEngine;
use crate::errors::{Result, SessionError};
use crate::media::{MediaProvider, NoopMediaProvider};
use crate::signaling::SignalChannel;
use crate::types::ParticipantId;

/// Builder for SignalingEngine
#[derive(Default)]
pub struct SignalingEngineBuilder {
    config: EngineConfig,
    channel: Option<Arc<dyn SignalChannel>>,
    media: Option<Arc<dyn MediaProvider>>,
}

impl SignalingEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_local_participant(mut self, participant: impl Into<ParticipantId>) -> Self {
        self.config.local_participant = participant.into();
        self
    }

    pub fn with_answer_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_answer_timeout(timeout);
        self
    }

    /// Set the signaling transport (required)
    pub fn with_channel<C>(mut self, channel: Arc<C>) -> Self
    where
        C: SignalChannel + 'static,
    {
        self.channel = Some(channel);
        self
    }

    pub fn with_media_provider<M>(mut self, media: Arc<M>) -> Self
    where
        M: MediaProvider + 'static,
    {
        self.media = Some(media);
        self
    }

    /// Validate the configuration and build the engine; call `start` to begin receiving
    pub fn build(self) -> Result<SignalingEngine> {
        self.config.validate()?;

        let channel = self
            .channel
            .ok_or_else(|| SessionError::config("a signal channel is required"))?;
        let media = self.media.unwrap_or_else(|| Arc::new(NoopMediaProvider));

        tracing::debug!(
            "Building signaling engine for {} (answer timeout {:?})",
            self.config.local_participant,
            self.config.answer_timeout()
        );
        Ok(SignalingEngine::from_parts(self.config, channel, media))
    }
}
