//! Signaling engine
//!
//! [`SignalingEngine`] is the single entry point for both sides of a call:
//! local commands (`initiate`, `accept`, `reject`, `hang_up`) and inbound
//! signaling messages (`handle_inbound`). Every change to a session goes
//! through [`EngineInner::drive`] while that session's mutex is held, which
//! keeps transitions, their side effects and their events in one order.
//!
//! Local commands are checked against a throwaway copy of the session before
//! anything is sent, and only applied for real once the send succeeded, so a
//! transport failure leaves the session exactly as it was.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{join_all, try_join_all};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::coordinator::builder::SignalingEngineBuilder;
use crate::coordinator::registry::{RegistryStats, SessionRegistry};
use crate::errors::{Result, SessionError};
use crate::events::{EventBus, EventSubscriber, SessionEvent};
use crate::media::MediaProvider;
use crate::session::{CallSession, SessionEffect, SessionInput};
use crate::signaling::{IceCandidate, SignalChannel, SignalMessage};
use crate::types::{
    CallState, CloseReason, MediaKind, PeerConnectionState, ParticipantId, SessionId, SessionRole, TrackKind, UserInfo,
};

/// Answer timer for one session
#[derive(Debug)]
pub(crate) struct RingTimer {
    pub(crate) epoch: u64,
    pub(crate) handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
pub(crate) struct EngineCounters {
    pub(crate) inbound_messages: AtomicU64,
    pub(crate) unknown_session_drops: AtomicU64,
    pub(crate) duplicate_offers: AtomicU64,
    pub(crate) busy_rejections: AtomicU64,
    pub(crate) invalid_messages: AtomicU64,
    pub(crate) transport_failures: AtomicU64,
    pub(crate) timeouts: AtomicU64,
}

impl EngineCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Engine counters plus registry totals
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub inbound_messages: u64,
    pub unknown_session_drops: u64,
    pub duplicate_offers: u64,
    pub busy_rejections: u64,
    pub invalid_messages: u64,
    pub transport_failures: u64,
    pub timeouts: u64,
    pub sessions: RegistryStats,
}

pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) registry: SessionRegistry,
    pub(crate) channel: Arc<dyn SignalChannel>,
    pub(crate) media: Arc<dyn MediaProvider>,
    pub(crate) events: EventBus,
    pub(crate) timers: DashMap<SessionId, RingTimer>,
    /// Per-session inbound queues, see the inbound module
    pub(crate) workers: DashMap<SessionId, mpsc::Sender<SignalMessage>>,
    pub(crate) counters: EngineCounters,
    pub(crate) inbound_task: Mutex<Option<JoinHandle<()>>>,
    pub(crate) shut_down: AtomicBool,
}

impl EngineInner {
    pub(crate) fn local_id(&self) -> &ParticipantId {
        &self.config.local_participant
    }

    /// Apply `input` and carry out everything it implies: media, timers,
    /// events, the Ending -> Closed cleanup step and retirement.
    pub(crate) async fn drive(self: &Arc<Self>, session: &mut CallSession, input: SessionInput) -> Result<()> {
        let mut outcome = session.apply(input)?;
        loop {
            for effect in outcome.effects.drain(..) {
                self.execute(session, effect).await;
            }
            for event in outcome.events.drain(..) {
                self.events.publish(event);
            }
            if session.state() != CallState::Ending {
                break;
            }
            // local cleanup has nothing left to wait for
            outcome = session.apply(SessionInput::CleanupComplete)?;
        }

        if session.is_terminal() {
            self.retire(session.id()).await;
        }
        Ok(())
    }

    async fn execute(self: &Arc<Self>, session: &mut CallSession, effect: SessionEffect) {
        let session_id = session.id().clone();
        match effect {
            SessionEffect::AttachMedia => {
                if let Err(e) = self.media.attach(&session_id, session.media_kind(), &self.config.media).await {
                    tracing::warn!("Failed to attach media for {}: {}", session_id, e);
                }
                for (from, candidate) in session.take_pending_candidates() {
                    if let Err(e) = self.media.add_remote_candidate(&session_id, &from, &candidate).await {
                        tracing::warn!("Failed to apply buffered candidate from {} for {}: {}", from, session_id, e);
                    }
                }
            }
            SessionEffect::DetachMedia => {
                if let Err(e) = self.media.detach(&session_id).await {
                    tracing::warn!("Failed to detach media for {}: {}", session_id, e);
                }
            }
            SessionEffect::StartAnswerTimer { epoch } => self.start_answer_timer(&session_id, epoch),
            SessionEffect::CancelAnswerTimer => self.cancel_answer_timer(&session_id),
        }
    }

    async fn retire(&self, session_id: &SessionId) {
        self.cancel_answer_timer(session_id);
        self.registry.remove(session_id).await;
        // the worker drains what it already holds and exits
        self.workers.remove(session_id);
    }

    fn start_answer_timer(self: &Arc<Self>, session_id: &SessionId, epoch: u64) {
        let engine = Arc::downgrade(self);
        let timeout = self.config.answer_timeout();
        let timer_session = session_id.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(engine) = engine.upgrade() {
                engine.on_answer_timeout(timer_session, epoch).await;
            }
        });

        if let Some(previous) = self.timers.insert(session_id.clone(), RingTimer { epoch, handle }) {
            previous.handle.abort();
        }
        tracing::debug!("Answer timer {} armed for {} ({:?})", epoch, session_id, timeout);
    }

    fn cancel_answer_timer(&self, session_id: &SessionId) {
        if let Some((_, timer)) = self.timers.remove(session_id) {
            timer.handle.abort();
            tracing::debug!("Answer timer {} cancelled for {}", timer.epoch, session_id);
        }
    }

    async fn on_answer_timeout(self: &Arc<Self>, session_id: SessionId, epoch: u64) {
        // only this timer's own entry; a newer one may already be armed
        self.timers.remove_if(&session_id, |_, timer| timer.epoch == epoch);

        let Some(handle) = self.registry.get(&session_id).await else {
            return;
        };
        let mut session = handle.lock().await;
        // a callee past accept has told the initiator it is in the call
        let accepted = session.role() == SessionRole::Callee && session.state() == CallState::Connecting;

        if let Err(e) = self.drive(&mut session, SessionInput::AnswerTimeout { epoch }).await {
            tracing::warn!("Answer timeout for {} could not be applied: {}", session_id, e);
            return;
        }
        if session.state() != CallState::Failed {
            return;
        }

        EngineCounters::bump(&self.counters.timeouts);
        tracing::info!("Session {} timed out waiting for an answer", session_id);

        if session.role() == SessionRole::Initiator || accepted {
            let pending: Vec<ParticipantId> = session.remaining_opponents().cloned().collect();
            for opponent in pending {
                let message = SignalMessage::hang_up(&session_id, self.local_id(), &opponent, None);
                self.send_best_effort(message).await;
            }
        }
    }

    pub(crate) async fn send(&self, message: SignalMessage) -> Result<()> {
        let recipient = message.recipient_id.clone();
        match self.channel.send(message).await {
            Ok(()) => Ok(()),
            Err(e) => {
                EngineCounters::bump(&self.counters.transport_failures);
                tracing::warn!("Failed to send signaling message to {}: {}", recipient, e);
                match e {
                    SessionError::Transport { .. } => Err(e),
                    other => Err(SessionError::transport(other.to_string())),
                }
            }
        }
    }

    pub(crate) async fn send_best_effort(&self, message: SignalMessage) {
        let _ = self.send(message).await;
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(SessionError::config("engine has been shut down"));
        }
        Ok(())
    }

    /// Live session for a local command; absent, ending and terminal are all `NoSuchSession`
    async fn live_session(&self, session_id: &SessionId) -> Result<Arc<Mutex<CallSession>>> {
        self.ensure_running()?;
        let handle = self.registry.get(session_id).await.ok_or_else(|| SessionError::NoSuchSession {
            session_id: session_id.clone(),
        })?;
        Self::require_live(&*handle.lock().await)?;
        Ok(handle)
    }

    /// A session the answer timer failed while the caller waited for it is `Timeout`
    fn require_live(session: &CallSession) -> Result<()> {
        if session.state().is_live() {
            return Ok(());
        }
        if session.state() == CallState::Failed && session.close_reason() == Some(&CloseReason::Timeout) {
            return Err(SessionError::Timeout {
                session_id: session.id().clone(),
            });
        }
        Err(SessionError::NoSuchSession {
            session_id: session.id().clone(),
        })
    }

    /// Run a local command: preflight on a copy, send, then apply
    async fn command(
        self: &Arc<Self>,
        session_id: &SessionId,
        input: SessionInput,
        build: impl Fn(&CallSession) -> Vec<SignalMessage>,
    ) -> Result<()> {
        let handle = self.live_session(session_id).await?;
        let mut session = handle.lock().await;
        Self::require_live(&session)?;

        session.clone().apply(input.clone())?;

        let sends = build(&session).into_iter().map(|message| self.send(message));
        try_join_all(sends).await?;
        self.drive(&mut session, input).await
    }
}

/// Call-session signaling and negotiation engine for one local participant
#[derive(Clone)]
pub struct SignalingEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl std::fmt::Debug for SignalingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingEngine")
            .field("local_participant", self.inner.local_id())
            .finish_non_exhaustive()
    }
}

impl SignalingEngine {
    pub fn builder() -> SignalingEngineBuilder {
        SignalingEngineBuilder::new()
    }

    pub(crate) fn from_parts(
        config: EngineConfig,
        channel: Arc<dyn SignalChannel>,
        media: Arc<dyn MediaProvider>,
    ) -> Self {
        let inner = EngineInner {
            registry: SessionRegistry::new(config.retired_session_capacity),
            events: EventBus::new(config.event_capacity),
            config,
            channel,
            media,
            timers: DashMap::new(),
            workers: DashMap::new(),
            counters: EngineCounters::default(),
            inbound_task: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn local_participant(&self) -> &ParticipantId {
        self.inner.local_id()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Place a call to `opponents`; the session is `Connecting` once every Offer went out
    pub async fn initiate<I, P>(
        &self,
        opponents: I,
        media_kind: MediaKind,
        user_info: Option<UserInfo>,
    ) -> Result<SessionId>
    where
        I: IntoIterator<Item = P>,
        P: Into<ParticipantId>,
    {
        let inner = &self.inner;
        inner.ensure_running()?;
        let local_id = inner.local_id().clone();

        let opponents: BTreeSet<ParticipantId> = opponents.into_iter().map(Into::into).collect();
        if opponents.is_empty() {
            return Err(SessionError::invalid_participants("at least one opponent is required"));
        }
        if opponents.contains(&local_id) {
            return Err(SessionError::invalid_participants("cannot call yourself"));
        }
        if opponents.iter().any(ParticipantId::is_empty) {
            return Err(SessionError::invalid_participants("participant ids must not be empty"));
        }

        let session = CallSession::outgoing(SessionId::new(), local_id.clone(), opponents, media_kind, user_info.clone());
        let session_id = session.id().clone();
        let handle = inner.registry.insert(session).await?;
        let mut session = handle.lock().await;

        let participants = session.participant_ids().clone();
        let targets: Vec<ParticipantId> = session.opponents().cloned().collect();
        let mut offered = Vec::with_capacity(targets.len());

        for opponent in targets {
            let offer = SignalMessage::offer(
                &session_id,
                &local_id,
                &opponent,
                participants.clone(),
                media_kind,
                user_info.clone(),
            );
            if let Err(e) = inner.send(offer).await {
                for reached in &offered {
                    let cancel = SignalMessage::hang_up(&session_id, &local_id, reached, None);
                    inner.send_best_effort(cancel).await;
                }
                drop(session);
                inner.registry.discard(&session_id).await;
                return Err(e);
            }
            offered.push(opponent);
        }

        inner.drive(&mut session, SessionInput::Start).await?;
        tracing::info!("Started {:?} call {} to {} participant(s)", media_kind, session_id, offered.len());
        Ok(session_id)
    }

    /// Accept a ringing call
    pub async fn accept(&self, session_id: &SessionId, user_info: Option<UserInfo>) -> Result<()> {
        let local_id = self.inner.local_id().clone();
        self.inner
            .command(session_id, SessionInput::LocalAccept, |session| {
                vec![SignalMessage::accept(session.id(), &local_id, session.initiator_id(), user_info.clone())]
            })
            .await
    }

    /// Decline a ringing call
    pub async fn reject(&self, session_id: &SessionId, user_info: Option<UserInfo>) -> Result<()> {
        let local_id = self.inner.local_id().clone();
        self.inner
            .command(session_id, SessionInput::LocalReject, |session| {
                vec![SignalMessage::reject(session.id(), &local_id, session.initiator_id(), user_info.clone())]
            })
            .await
    }

    /// Leave the call, telling every participant still in it
    pub async fn hang_up(&self, session_id: &SessionId, user_info: Option<UserInfo>) -> Result<()> {
        let local_id = self.inner.local_id().clone();
        self.inner
            .command(session_id, SessionInput::LocalHangUp, |session| {
                session
                    .remaining_opponents()
                    .map(|opponent| SignalMessage::hang_up(session.id(), &local_id, opponent, user_info.clone()))
                    .collect()
            })
            .await
    }

    /// Report the media path state towards `participant_id`, as observed locally
    ///
    /// Applied before this returns, under the session lock, without going
    /// through the receive loop's per-session queue. Reports therefore order
    /// against queued remote messages by lock acquisition, not arrival.
    pub async fn report_connection_state(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
        state: PeerConnectionState,
    ) -> Result<()> {
        self.inner.ensure_running()?;
        if self.inner.registry.get(session_id).await.is_none() {
            return Err(SessionError::NoSuchSession {
                session_id: session_id.clone(),
            });
        }
        let message = SignalMessage::connection_state(session_id, participant_id, self.inner.local_id(), state);
        self.inner.route_inbound(message).await
    }

    /// Announce a remote track from a connected participant
    pub async fn report_remote_track(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
        track: TrackKind,
    ) -> Result<()> {
        let handle = self.inner.live_session(session_id).await?;
        let session = handle.lock().await;

        if session.state() != CallState::Active {
            return Err(SessionError::invalid_state(session_id, session.state(), "report a remote track for"));
        }
        if !session.connected_participant_ids().contains(participant_id) {
            return Err(SessionError::UnknownParticipant {
                session_id: session_id.clone(),
                participant_id: participant_id.clone(),
            });
        }
        if !session.media_kind().allows(track) {
            return Err(SessionError::media(format!(
                "{:?} track not allowed on {:?} session {}",
                track,
                session.media_kind(),
                session_id
            )));
        }

        self.inner.events.publish(SessionEvent::RemoteTrackAvailable {
            session_id: session_id.clone(),
            participant_id: participant_id.clone(),
            track,
        });
        Ok(())
    }

    /// Trickle a local ICE candidate to every participant still in the call
    pub async fn send_ice_candidate(&self, session_id: &SessionId, candidate: IceCandidate) -> Result<()> {
        let handle = self.inner.live_session(session_id).await?;
        let session = handle.lock().await;

        let sends = session.remaining_opponents().map(|opponent| {
            let message = SignalMessage::ice_candidate(session_id, self.inner.local_id(), opponent, candidate.clone());
            self.inner.send(message)
        });
        try_join_all(sends).await?;
        Ok(())
    }

    /// Snapshot of a registered session
    pub async fn session(&self, session_id: &SessionId) -> Option<CallSession> {
        let handle = self.inner.registry.get(session_id).await?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// The local participant's non-terminal session, if any
    pub async fn active_session(&self) -> Option<SessionId> {
        self.inner.registry.active_session_for(self.inner.local_id()).await
    }

    pub fn subscribe(&self) -> EventSubscriber {
        self.inner.events.subscribe()
    }

    pub async fn stats(&self) -> EngineStats {
        let counters = &self.inner.counters;
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        EngineStats {
            inbound_messages: load(&counters.inbound_messages),
            unknown_session_drops: load(&counters.unknown_session_drops),
            duplicate_offers: load(&counters.duplicate_offers),
            busy_rejections: load(&counters.busy_rejections),
            invalid_messages: load(&counters.invalid_messages),
            transport_failures: load(&counters.transport_failures),
            timeouts: load(&counters.timeouts),
            sessions: self.inner.registry.stats().await,
        }
    }

    /// Stop the inbound loop, hang up every live session and cancel all timers
    pub async fn shutdown(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(task) = inner.inbound_task.lock().await.take() {
            task.abort();
        }

        let session_ids = inner.registry.session_ids().await;
        if !session_ids.is_empty() {
            tracing::info!("Terminating {} session(s) before shutdown", session_ids.len());
        }
        for session_id in session_ids {
            let Some(handle) = inner.registry.get(&session_id).await else {
                continue;
            };
            let mut session = handle.lock().await;

            match session.state() {
                CallState::Created => {
                    drop(session);
                    inner.registry.discard(&session_id).await;
                }
                state if state.is_live() => {
                    let farewells = session.remaining_opponents().map(|opponent| {
                        inner.send_best_effort(SignalMessage::hang_up(&session_id, inner.local_id(), opponent, None))
                    });
                    join_all(farewells).await;
                    if let Err(e) = inner.drive(&mut session, SessionInput::Shutdown).await {
                        tracing::warn!("Failed to shut down session {}: {}", session_id, e);
                    }
                }
                _ => {}
            }
        }

        let timers: Vec<SessionId> = inner.timers.iter().map(|entry| entry.key().clone()).collect();
        for session_id in timers {
            inner.cancel_answer_timer(&session_id);
        }
        inner.workers.clear();

        tracing::info!("Signaling engine for {} shut down", inner.local_id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::MemorySignalHub;

    fn engine(hub: &MemorySignalHub, id: &str) -> SignalingEngine {
        SignalingEngine::builder()
            .with_local_participant(id)
            .with_channel(Arc::new(hub.connect(id)))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_initiate_validates_opponents() {
        let hub = MemorySignalHub::new();
        let alice = engine(&hub, "alice");

        let none: Vec<&str> = Vec::new();
        assert!(matches!(
            alice.initiate(none, MediaKind::AudioOnly, None).await,
            Err(SessionError::InvalidParticipants { .. })
        ));
        assert!(matches!(
            alice.initiate(["alice"], MediaKind::AudioOnly, None).await,
            Err(SessionError::InvalidParticipants { .. })
        ));
        assert!(alice.active_session().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_offer_leaves_no_session() {
        let hub = MemorySignalHub::new();
        let alice = engine(&hub, "alice");

        let err = alice.initiate(["nobody"], MediaKind::AudioVideo, None).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(alice.active_session().await.is_none());
        assert_eq!(alice.stats().await.transport_failures, 1);
    }

    #[tokio::test]
    async fn test_commands_on_unknown_session() {
        let hub = MemorySignalHub::new();
        let alice = engine(&hub, "alice");
        let missing = SessionId::from("missing");

        for result in [
            alice.accept(&missing, None).await,
            alice.reject(&missing, None).await,
            alice.hang_up(&missing, None).await,
        ] {
            assert_eq!(result, Err(SessionError::NoSuchSession { session_id: missing.clone() }));
        }
    }

    #[tokio::test]
    async fn test_remote_track_requires_active_session() {
        let hub = MemorySignalHub::new();
        let alice = engine(&hub, "alice");
        let _bob = hub.connect("bob");

        let session_id = alice.initiate(["bob"], MediaKind::AudioOnly, None).await.unwrap();
        let bob = ParticipantId::from("bob");
        assert!(matches!(
            alice.report_remote_track(&session_id, &bob, TrackKind::Audio).await,
            Err(SessionError::InvalidState { .. })
        ));

        alice
            .report_connection_state(&session_id, &bob, PeerConnectionState::Connected)
            .await
            .unwrap();
        alice.report_remote_track(&session_id, &bob, TrackKind::Audio).await.unwrap();
        assert!(matches!(
            alice.report_remote_track(&session_id, &bob, TrackKind::Video).await,
            Err(SessionError::Media { .. })
        ));
    }

    fn offer(session_id: &SessionId, from: &str, to: &str) -> SignalMessage {
        let participants: BTreeSet<ParticipantId> = [from, to].into_iter().map(ParticipantId::from).collect();
        SignalMessage::offer(
            session_id,
            &ParticipantId::from(from),
            &ParticipantId::from(to),
            participants,
            MediaKind::AudioVideo,
            None,
        )
    }

    #[tokio::test]
    async fn test_engine_refuses_work_after_shutdown() {
        let hub = MemorySignalHub::new();
        let alice = engine(&hub, "alice");
        let _bob = hub.connect("bob");
        alice.shutdown().await.unwrap();

        assert!(matches!(
            alice.initiate(["bob"], MediaKind::AudioOnly, None).await,
            Err(SessionError::Config { .. })
        ));
        assert!(alice.active_session().await.is_none());
        assert!(alice.inner.timers.is_empty());

        let late = SessionId::from("late");
        assert!(matches!(
            alice.handle_inbound(offer(&late, "bob", "alice")).await,
            Err(SessionError::Config { .. })
        ));
        assert!(alice.session(&late).await.is_none());
        assert!(matches!(alice.accept(&late, None).await, Err(SessionError::Config { .. })));
        assert!(matches!(
            alice.send_ice_candidate(&late, IceCandidate::new("candidate:1")).await,
            Err(SessionError::Config { .. })
        ));
        assert!(matches!(
            alice
                .report_connection_state(&late, &ParticipantId::from("bob"), PeerConnectionState::Connected)
                .await,
            Err(SessionError::Config { .. })
        ));

        let stats = alice.stats().await;
        assert_eq!(stats.inbound_messages, 0);
        assert_eq!(stats.sessions.total_created, 0);
    }

    #[tokio::test]
    async fn test_command_racing_answer_timer_reports_timeout() {
        let hub = MemorySignalHub::new();
        let bob = engine(&hub, "bob");
        let _alice = hub.connect("alice");
        let session_id = SessionId::from("race");
        bob.handle_inbound(offer(&session_id, "alice", "bob")).await.unwrap();

        // hold the session so the accept queues behind the timer
        let handle = bob.inner.registry.get(&session_id).await.unwrap();
        let mut session = handle.lock().await;
        let accepting = tokio::spawn({
            let bob = bob.clone();
            let session_id = session_id.clone();
            async move { bob.accept(&session_id, None).await }
        });
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        let epoch = session.timer_epoch();
        bob.inner
            .drive(&mut session, SessionInput::AnswerTimeout { epoch })
            .await
            .unwrap();
        drop(session);

        assert_eq!(accepting.await.unwrap(), Err(SessionError::Timeout { session_id: session_id.clone() }));
        assert!(bob.session(&session_id).await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_closes_live_sessions() {
        let hub = MemorySignalHub::new();
        let alice = engine(&hub, "alice");
        let _bob = hub.connect("bob");
        let mut events = alice.subscribe();

        let session_id = alice.initiate(["bob"], MediaKind::AudioVideo, None).await.unwrap();
        alice.shutdown().await.unwrap();

        assert!(alice.session(&session_id).await.is_none());
        assert!(alice.inner.timers.is_empty());

        let mut last = None;
        while let Ok(Some(event)) = events.try_receive() {
            last = Some(event);
        }
        assert_eq!(
            last,
            Some(SessionEvent::SessionClosed {
                session_id,
                reason: crate::types::CloseReason::Shutdown,
            })
        );
    }
}
