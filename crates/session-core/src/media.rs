//! Media provider seam
//!
//! The engine never touches capture, rendering or the media transport itself.
//! It attaches an opaque media handle when a session enters `Connecting`,
//! detaches it on the way out, and forwards remote ICE candidates. The
//! process-wide media settings live in [`MediaConfig`] and are handed to the
//! provider on every attach.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SessionError};
use crate::signaling::IceCandidate;
use crate::types::{MediaKind, ParticipantId, SessionId};

/// Preferred video codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Vp8,
    Vp9,
}

/// Preferred audio codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Opus,
    Isac,
    Ilbc,
}

/// Camera used for local capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    Front,
    Back,
}

/// Audio route used once a call is connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioOutput {
    Speaker,
    Receiver,
    Headset,
}

/// Capture pixel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Nv12Full,
    Nv12Video,
    Bgra,
}

/// Capture format for the local camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub pixel_format: PixelFormat,
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            frame_rate: 21,
            pixel_format: PixelFormat::Nv12Full,
        }
    }
}

/// Media settings shared by every session of an engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    pub video_format: VideoFormat,
    pub camera_position: CameraPosition,
    pub audio_output: AudioOutput,
    /// Allow Bluetooth (A2DP/HFP) audio routes
    pub allow_bluetooth: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            video_codec: VideoCodec::H264,
            audio_codec: AudioCodec::Opus,
            video_format: VideoFormat::default(),
            camera_position: CameraPosition::Front,
            audio_output: AudioOutput::Speaker,
            allow_bluetooth: true,
        }
    }
}

impl MediaConfig {
    pub fn validate(&self) -> Result<()> {
        let format = &self.video_format;
        if format.width == 0 || format.height == 0 || format.frame_rate == 0 {
            return Err(SessionError::config(format!(
                "video format must be non-zero, got {}x{}@{}",
                format.width, format.height, format.frame_rate
            )));
        }
        Ok(())
    }
}

/// Capture/render collaborator driven by session transitions
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Attach local capture and prepare rendering for a session entering `Connecting`
    async fn attach(&self, session_id: &SessionId, media_kind: MediaKind, config: &MediaConfig) -> Result<()>;

    /// Release everything attached for the session
    async fn detach(&self, session_id: &SessionId) -> Result<()>;

    /// Hand a remote ICE candidate to the media transport
    async fn add_remote_candidate(
        &self,
        session_id: &SessionId,
        from: &ParticipantId,
        candidate: &IceCandidate,
    ) -> Result<()>;
}

/// Provider used when no media engine is wired in
#[derive(Debug, Default, Clone)]
pub struct NoopMediaProvider;

#[async_trait]
impl MediaProvider for NoopMediaProvider {
    async fn attach(&self, session_id: &SessionId, media_kind: MediaKind, _config: &MediaConfig) -> Result<()> {
        tracing::debug!("No media provider: skipping attach of {:?} for {}", media_kind, session_id);
        Ok(())
    }

    async fn detach(&self, session_id: &SessionId) -> Result<()> {
        tracing::debug!("No media provider: skipping detach for {}", session_id);
        Ok(())
    }

    async fn add_remote_candidate(
        &self,
        _session_id: &SessionId,
        _from: &ParticipantId,
        _candidate: &IceCandidate,
    ) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_media_config() {
        let config = MediaConfig::default();
        assert_eq!(config.video_codec, VideoCodec::H264);
        assert_eq!(config.audio_codec, AudioCodec::Opus);
        assert_eq!(config.video_format.width, 640);
        assert_eq!(config.video_format.height, 480);
        assert_eq!(config.video_format.frame_rate, 21);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_frame_rate_is_rejected() {
        let mut config = MediaConfig::default();
        config.video_format.frame_rate = 0;
        assert!(matches!(config.validate(), Err(SessionError::Config { .. })));
    }
}
