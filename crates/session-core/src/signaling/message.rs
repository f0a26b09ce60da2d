//! Signaling messages
//!
//! A [`SignalMessage`] is the only unit exchanged with peers. `kind` drives
//! routing, `payload` carries the kind-specific data; [`SignalMessage::validate`]
//! checks that the two agree before the engine acts on anything decoded from
//! the wire.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SessionError};
use crate::types::{MediaKind, PeerConnectionState, ParticipantId, SessionId, UserInfo};

/// Routing discriminator of a signaling message
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Offer,
    Accept,
    Reject,
    HangUp,
    IceCandidate,
    ConnectionStateUpdate,
}

/// A trickled ICE candidate, opaque to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
        }
    }
}

/// Kind-specific data of a signaling message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalPayload {
    /// Accept, Reject and HangUp carry nothing beyond the envelope
    Empty,
    Offer {
        initiator_id: ParticipantId,
        participant_ids: BTreeSet<ParticipantId>,
        media_kind: MediaKind,
    },
    IceCandidate {
        candidate: IceCandidate,
    },
    ConnectionState {
        participant_id: ParticipantId,
        state: PeerConnectionState,
    },
}

/// Immutable signaling message addressed to one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMessage {
    pub session_id: SessionId,
    pub sender_id: ParticipantId,
    pub recipient_id: ParticipantId,
    pub kind: SignalKind,
    pub payload: SignalPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
}

impl SignalMessage {
    fn envelope(
        session_id: &SessionId,
        sender_id: &ParticipantId,
        recipient_id: &ParticipantId,
        kind: SignalKind,
        payload: SignalPayload,
        user_info: Option<UserInfo>,
    ) -> Self {
        Self {
            session_id: session_id.clone(),
            sender_id: sender_id.clone(),
            recipient_id: recipient_id.clone(),
            kind,
            payload,
            user_info,
        }
    }

    pub fn offer(
        session_id: &SessionId,
        initiator_id: &ParticipantId,
        recipient_id: &ParticipantId,
        participant_ids: BTreeSet<ParticipantId>,
        media_kind: MediaKind,
        user_info: Option<UserInfo>,
    ) -> Self {
        let payload = SignalPayload::Offer {
            initiator_id: initiator_id.clone(),
            participant_ids,
            media_kind,
        };
        Self::envelope(session_id, initiator_id, recipient_id, SignalKind::Offer, payload, user_info)
    }

    pub fn accept(
        session_id: &SessionId,
        sender_id: &ParticipantId,
        recipient_id: &ParticipantId,
        user_info: Option<UserInfo>,
    ) -> Self {
        Self::envelope(session_id, sender_id, recipient_id, SignalKind::Accept, SignalPayload::Empty, user_info)
    }

    pub fn reject(
        session_id: &SessionId,
        sender_id: &ParticipantId,
        recipient_id: &ParticipantId,
        user_info: Option<UserInfo>,
    ) -> Self {
        Self::envelope(session_id, sender_id, recipient_id, SignalKind::Reject, SignalPayload::Empty, user_info)
    }

    pub fn hang_up(
        session_id: &SessionId,
        sender_id: &ParticipantId,
        recipient_id: &ParticipantId,
        user_info: Option<UserInfo>,
    ) -> Self {
        Self::envelope(session_id, sender_id, recipient_id, SignalKind::HangUp, SignalPayload::Empty, user_info)
    }

    pub fn ice_candidate(
        session_id: &SessionId,
        sender_id: &ParticipantId,
        recipient_id: &ParticipantId,
        candidate: IceCandidate,
    ) -> Self {
        let payload = SignalPayload::IceCandidate { candidate };
        Self::envelope(session_id, sender_id, recipient_id, SignalKind::IceCandidate, payload, None)
    }

    /// Connection report about `participant_id`; the media engine reports it as if sent by that participant
    pub fn connection_state(
        session_id: &SessionId,
        participant_id: &ParticipantId,
        recipient_id: &ParticipantId,
        state: PeerConnectionState,
    ) -> Self {
        let payload = SignalPayload::ConnectionState {
            participant_id: participant_id.clone(),
            state,
        };
        Self::envelope(
            session_id,
            participant_id,
            recipient_id,
            SignalKind::ConnectionStateUpdate,
            payload,
            None,
        )
    }

    /// Check that the payload matches the kind and that the addressing is coherent
    pub fn validate(&self) -> Result<()> {
        if self.sender_id.is_empty() || self.recipient_id.is_empty() {
            return Err(SessionError::invalid_message("sender and recipient must be set"));
        }
        if self.session_id.as_str().is_empty() {
            return Err(SessionError::invalid_message("session id must be set"));
        }

        match (self.kind, &self.payload) {
            (SignalKind::Offer, SignalPayload::Offer { initiator_id, participant_ids, .. }) => {
                if *initiator_id != self.sender_id {
                    return Err(SessionError::invalid_message(format!(
                        "offer sender {} is not the initiator {}",
                        self.sender_id, initiator_id
                    )));
                }
                if !participant_ids.contains(initiator_id) || !participant_ids.contains(&self.recipient_id) {
                    return Err(SessionError::invalid_message(
                        "offer participant set must contain the initiator and the recipient",
                    ));
                }
                if participant_ids.len() < 2 {
                    return Err(SessionError::invalid_message("offer needs at least two participants"));
                }
                Ok(())
            }
            (SignalKind::Accept | SignalKind::Reject | SignalKind::HangUp, SignalPayload::Empty) => Ok(()),
            (SignalKind::IceCandidate, SignalPayload::IceCandidate { candidate }) => {
                if candidate.candidate.is_empty() {
                    return Err(SessionError::invalid_message("empty ICE candidate"));
                }
                Ok(())
            }
            (SignalKind::ConnectionStateUpdate, SignalPayload::ConnectionState { participant_id, .. }) => {
                if *participant_id != self.sender_id {
                    return Err(SessionError::invalid_message(
                        "connection state must be reported for its sender",
                    ));
                }
                Ok(())
            }
            (kind, payload) => Err(SessionError::invalid_message(format!(
                "payload {:?} does not match kind {:?}",
                payload, kind
            ))),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode and validate a message received from the wire
    pub fn from_json(json: &str) -> Result<Self> {
        let message: SignalMessage = serde_json::from_str(json)?;
        message.validate()?;
        Ok(message)
    }
}
