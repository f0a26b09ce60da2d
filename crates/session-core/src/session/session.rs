//! Session Implementation
//!
//! [`CallSession`] is a pure state machine. Every cause of change is a
//! [`SessionInput`] fed through [`CallSession::apply`], which returns the
//! events to publish and the side effects (media, timers) for the engine to
//! carry out. Nothing here performs I/O.

use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};

use crate::errors::{Result, SessionError};
use crate::events::SessionEvent;
use crate::signaling::IceCandidate;
use crate::types::{
    CallState, CloseReason, MediaKind, PeerConnectionState, ParticipantId, SessionId, SessionRole, UserInfo,
};

/// Remote candidates kept per session until media is attached
pub const MAX_PENDING_CANDIDATES: usize = 64;

/// Closed set of transition causes
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// Local call placed and every Offer sent
    Start,
    /// Registered from an inbound Offer
    Offered,
    LocalAccept,
    LocalReject,
    LocalHangUp,
    Shutdown,
    RemoteAccept { from: ParticipantId },
    RemoteReject { from: ParticipantId },
    RemoteHangUp { from: ParticipantId },
    ConnectionState { participant_id: ParticipantId, state: PeerConnectionState },
    AnswerTimeout { epoch: u64 },
    CleanupComplete,
}

impl SessionInput {
    pub fn name(&self) -> &'static str {
        match self {
            SessionInput::Start => "start",
            SessionInput::Offered => "offer",
            SessionInput::LocalAccept => "accept",
            SessionInput::LocalReject => "reject",
            SessionInput::LocalHangUp => "hang up",
            SessionInput::Shutdown => "shut down",
            SessionInput::RemoteAccept { .. } => "apply remote accept to",
            SessionInput::RemoteReject { .. } => "apply remote reject to",
            SessionInput::RemoteHangUp { .. } => "apply remote hang up to",
            SessionInput::ConnectionState { .. } => "apply connection state to",
            SessionInput::AnswerTimeout { .. } => "time out",
            SessionInput::CleanupComplete => "close",
        }
    }
}

/// Side effects requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEffect {
    AttachMedia,
    DetachMedia,
    StartAnswerTimer { epoch: u64 },
    CancelAnswerTimer,
}

/// Result of applying one input
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Outcome {
    pub events: Vec<SessionEvent>,
    pub effects: Vec<SessionEffect>,
}

impl Outcome {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.effects.is_empty()
    }
}

/// State of one call, owned by the session registry
#[derive(Debug, Clone)]
pub struct CallSession {
    id: SessionId,
    local_id: ParticipantId,
    initiator_id: ParticipantId,
    participant_ids: BTreeSet<ParticipantId>,
    media_kind: MediaKind,
    role: SessionRole,
    state: CallState,
    connected_participant_ids: BTreeSet<ParticipantId>,
    /// Participants that rejected, hung up or lost their connection
    departed_participant_ids: BTreeSet<ParticipantId>,
    user_info: Option<UserInfo>,
    close_reason: Option<CloseReason>,
    media_attached: bool,
    timer_epoch: u64,
    pending_candidates: VecDeque<(ParticipantId, IceCandidate)>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CallSession {
    fn new(
        id: SessionId,
        local_id: ParticipantId,
        initiator_id: ParticipantId,
        participant_ids: BTreeSet<ParticipantId>,
        media_kind: MediaKind,
        role: SessionRole,
        user_info: Option<UserInfo>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            local_id,
            initiator_id,
            participant_ids,
            media_kind,
            role,
            state: CallState::Created,
            connected_participant_ids: BTreeSet::new(),
            departed_participant_ids: BTreeSet::new(),
            user_info,
            close_reason: None,
            media_attached: false,
            timer_epoch: 0,
            pending_candidates: VecDeque::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Session placed by the local participant towards `opponents`
    pub fn outgoing(
        id: SessionId,
        local_id: ParticipantId,
        opponents: BTreeSet<ParticipantId>,
        media_kind: MediaKind,
        user_info: Option<UserInfo>,
    ) -> Self {
        let mut participant_ids = opponents;
        participant_ids.insert(local_id.clone());
        Self::new(id, local_id.clone(), local_id, participant_ids, media_kind, SessionRole::Initiator, user_info)
    }

    /// Session created from a remote Offer
    pub fn incoming(
        id: SessionId,
        local_id: ParticipantId,
        initiator_id: ParticipantId,
        participant_ids: BTreeSet<ParticipantId>,
        media_kind: MediaKind,
        user_info: Option<UserInfo>,
    ) -> Self {
        Self::new(id, local_id, initiator_id, participant_ids, media_kind, SessionRole::Callee, user_info)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    pub fn initiator_id(&self) -> &ParticipantId {
        &self.initiator_id
    }

    pub fn participant_ids(&self) -> &BTreeSet<ParticipantId> {
        &self.participant_ids
    }

    pub fn connected_participant_ids(&self) -> &BTreeSet<ParticipantId> {
        &self.connected_participant_ids
    }

    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn user_info(&self) -> Option<&UserInfo> {
        self.user_info.as_ref()
    }

    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_media_attached(&self) -> bool {
        self.media_attached
    }

    pub fn timer_epoch(&self) -> u64 {
        self.timer_epoch
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_participant(&self, participant: &ParticipantId) -> bool {
        self.participant_ids.contains(participant)
    }

    /// Every participant except the local one
    pub fn opponents(&self) -> impl Iterator<Item = &ParticipantId> {
        self.participant_ids.iter().filter(move |id| **id != self.local_id)
    }

    /// Opponents that have not rejected, hung up or dropped
    pub fn remaining_opponents(&self) -> impl Iterator<Item = &ParticipantId> {
        self.opponents()
            .filter(move |id| !self.departed_participant_ids.contains(*id))
    }

    pub fn buffer_candidate(&mut self, from: ParticipantId, candidate: IceCandidate) {
        if self.pending_candidates.len() >= MAX_PENDING_CANDIDATES {
            tracing::warn!("Session {} candidate buffer full, dropping oldest", self.id);
            self.pending_candidates.pop_front();
        }
        self.pending_candidates.push_back((from, candidate));
    }

    pub fn take_pending_candidates(&mut self) -> Vec<(ParticipantId, IceCandidate)> {
        self.pending_candidates.drain(..).collect()
    }

    /// Apply one transition cause
    pub fn apply(&mut self, input: SessionInput) -> Result<Outcome> {
        let mut out = Outcome::default();

        match input {
            SessionInput::Start => {
                self.require(self.role == SessionRole::Initiator && self.state == CallState::Created, "start")?;
                let event = SessionEvent::CallStarted {
                    session_id: self.id.clone(),
                    opponents: self.opponents().cloned().collect(),
                    media_kind: self.media_kind,
                };
                self.transition(CallState::Connecting, event, &mut out)?;
            }

            SessionInput::Offered => {
                self.require(self.role == SessionRole::Callee && self.state == CallState::Created, "offer")?;
                let event = SessionEvent::IncomingCall {
                    session_id: self.id.clone(),
                    initiator_id: self.initiator_id.clone(),
                    participant_ids: self.participant_ids.clone(),
                    media_kind: self.media_kind,
                    user_info: self.user_info.clone(),
                };
                self.transition(CallState::Ringing, event, &mut out)?;
            }

            SessionInput::LocalAccept => {
                self.require(self.state == CallState::Ringing, "accept")?;
                let event = SessionEvent::CallAccepted {
                    session_id: self.id.clone(),
                    by: self.local_id.clone(),
                };
                self.transition(CallState::Connecting, event, &mut out)?;
            }

            SessionInput::LocalReject => {
                self.require(self.state == CallState::Ringing, "reject")?;
                let by = self.local_id.clone();
                self.close(CallState::Rejected, CloseReason::Rejected { by }, &mut out)?;
            }

            SessionInput::LocalHangUp => {
                self.require(self.state.is_live() && self.state != CallState::Created, "hang up")?;
                let by = self.local_id.clone();
                self.begin_ending(CloseReason::HangUp { by }, &mut out)?;
            }

            SessionInput::Shutdown => {
                self.require(self.state.is_live() && self.state != CallState::Created, "shut down")?;
                self.begin_ending(CloseReason::Shutdown, &mut out)?;
            }

            SessionInput::RemoteAccept { from } => {
                self.require_remote(&from, "apply remote accept to")?;
                match self.state {
                    CallState::Ringing => {
                        let event = SessionEvent::CallAccepted {
                            session_id: self.id.clone(),
                            by: from,
                        };
                        self.transition(CallState::Connecting, event, &mut out)?;
                    }
                    CallState::Connecting | CallState::Active => self.participant_connected(from, &mut out)?,
                    state => return Err(SessionError::invalid_state(&self.id, state, "apply remote accept to")),
                }
            }

            SessionInput::RemoteReject { from } => {
                self.require_remote(&from, "apply remote reject to")?;
                match self.state {
                    CallState::Ringing => {
                        self.close(CallState::Rejected, CloseReason::Rejected { by: from }, &mut out)?;
                    }
                    CallState::Connecting | CallState::Active => {
                        if !self.departed_participant_ids.insert(from.clone()) {
                            return Ok(out);
                        }
                        self.connected_participant_ids.remove(&from);
                        out.events.push(SessionEvent::ParticipantRejected {
                            session_id: self.id.clone(),
                            participant_id: from.clone(),
                        });
                        if self.state == CallState::Connecting && self.remaining_opponents().next().is_none() {
                            self.close(CallState::Rejected, CloseReason::Rejected { by: from }, &mut out)?;
                        } else if self.state == CallState::Active && self.connected_participant_ids.is_empty() {
                            self.begin_ending(CloseReason::AllParticipantsLeft, &mut out)?;
                        }
                    }
                    state => return Err(SessionError::invalid_state(&self.id, state, "apply remote reject to")),
                }
            }

            SessionInput::RemoteHangUp { from } => {
                self.require_remote(&from, "apply remote hang up to")?;
                self.require(self.state.is_live() && self.state != CallState::Created, "apply remote hang up to")?;
                if from == self.initiator_id {
                    // the initiator leaving ends the call for everyone
                    self.begin_ending(CloseReason::HangUp { by: from }, &mut out)?;
                } else {
                    self.participant_left(from, &mut out)?;
                }
            }

            SessionInput::ConnectionState { participant_id, state } => {
                self.require_remote(&participant_id, "apply connection state to")?;
                self.require(self.state.is_live() && self.state != CallState::Created, "apply connection state to")?;
                match state {
                    PeerConnectionState::Connected => match self.state {
                        CallState::Connecting | CallState::Active => {
                            self.participant_connected(participant_id, &mut out)?
                        }
                        _ => tracing::debug!(
                            "Session {} ignoring connection of {} while {}",
                            self.id, participant_id, self.state
                        ),
                    },
                    PeerConnectionState::Failed | PeerConnectionState::Closed => {
                        self.participant_left(participant_id, &mut out)?
                    }
                    PeerConnectionState::Connecting | PeerConnectionState::Disconnected => {
                        tracing::debug!("Session {} peer {} is {:?}", self.id, participant_id, state);
                    }
                }
            }

            SessionInput::AnswerTimeout { epoch } => {
                if epoch != self.timer_epoch || !self.state.is_awaiting_answer() {
                    tracing::debug!("Session {} ignoring stale answer timer {}", self.id, epoch);
                    return Ok(out);
                }
                self.close(CallState::Failed, CloseReason::Timeout, &mut out)?;
            }

            SessionInput::CleanupComplete => {
                self.require(self.state == CallState::Ending, "close")?;
                let reason = self.close_reason.clone().unwrap_or(CloseReason::HangUp {
                    by: self.local_id.clone(),
                });
                let event = SessionEvent::SessionClosed {
                    session_id: self.id.clone(),
                    reason,
                };
                self.transition(CallState::Closed, event, &mut out)?;
            }
        }

        Ok(out)
    }

    fn require(&self, allowed: bool, operation: &str) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(SessionError::invalid_state(&self.id, self.state, operation))
        }
    }

    fn require_remote(&self, from: &ParticipantId, operation: &str) -> Result<()> {
        if *from == self.local_id {
            return Err(SessionError::invalid_state(&self.id, self.state, operation));
        }
        if !self.is_participant(from) {
            return Err(SessionError::UnknownParticipant {
                session_id: self.id.clone(),
                participant_id: from.clone(),
            });
        }
        Ok(())
    }

    fn participant_connected(&mut self, participant: ParticipantId, out: &mut Outcome) -> Result<()> {
        if self.departed_participant_ids.contains(&participant) {
            tracing::debug!("Session {} ignoring connection of departed {}", self.id, participant);
            return Ok(());
        }
        if !self.connected_participant_ids.insert(participant.clone()) {
            return Ok(());
        }

        let event = SessionEvent::SessionConnected {
            session_id: self.id.clone(),
            participant_id: participant,
        };
        if self.state == CallState::Connecting {
            self.transition(CallState::Active, event, out)
        } else {
            self.touch();
            out.events.push(event);
            Ok(())
        }
    }

    fn participant_left(&mut self, participant: ParticipantId, out: &mut Outcome) -> Result<()> {
        if !self.departed_participant_ids.insert(participant.clone()) {
            return Ok(());
        }
        self.connected_participant_ids.remove(&participant);
        self.touch();
        out.events.push(SessionEvent::RemoteParticipantLeft {
            session_id: self.id.clone(),
            participant_id: participant.clone(),
        });

        let nobody_left = match self.state {
            CallState::Active => self.connected_participant_ids.is_empty(),
            _ => self.remaining_opponents().next().is_none(),
        };
        if nobody_left {
            self.begin_ending(CloseReason::AllParticipantsLeft, out)?;
        }
        Ok(())
    }

    fn begin_ending(&mut self, reason: CloseReason, out: &mut Outcome) -> Result<()> {
        self.close_reason = Some(reason.clone());
        let event = SessionEvent::SessionEnding {
            session_id: self.id.clone(),
            reason,
        };
        self.transition(CallState::Ending, event, out)
    }

    /// Move straight into a terminal state other than Closed
    fn close(&mut self, terminal: CallState, reason: CloseReason, out: &mut Outcome) -> Result<()> {
        self.close_reason = Some(reason.clone());
        let event = SessionEvent::SessionClosed {
            session_id: self.id.clone(),
            reason,
        };
        self.transition(terminal, event, out)
    }

    fn transition(&mut self, next: CallState, event: SessionEvent, out: &mut Outcome) -> Result<()> {
        let previous = self.state;
        if !previous.can_transition_to(next) {
            return Err(SessionError::invalid_state(&self.id, previous, &format!("move to {}", next)));
        }

        if !previous.is_awaiting_answer() && next.is_awaiting_answer() {
            self.timer_epoch += 1;
            out.effects.push(SessionEffect::StartAnswerTimer { epoch: self.timer_epoch });
        } else if previous.is_awaiting_answer() && !next.is_awaiting_answer() {
            out.effects.push(SessionEffect::CancelAnswerTimer);
        }

        if next == CallState::Connecting && !self.media_attached {
            self.media_attached = true;
            out.effects.push(SessionEffect::AttachMedia);
        } else if (next == CallState::Ending || next.is_terminal()) && self.media_attached {
            self.media_attached = false;
            out.effects.push(SessionEffect::DetachMedia);
        }

        if next.is_terminal() {
            self.pending_candidates.clear();
        }

        self.state = next;
        self.touch();
        tracing::debug!("Session {} state: {} -> {}", self.id, previous, next);
        out.events.push(event);
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
