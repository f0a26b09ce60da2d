//! Inbound message handling
//!
//! The receive loop hands each message to a worker owned by the message's
//! session id. A worker processes its queue strictly in order, so messages
//! for one session are applied in arrival order while different sessions
//! proceed in parallel. Workers go away once their session is no longer
//! registered.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;

use crate::coordinator::engine::{EngineCounters, EngineInner, SignalingEngine};
use crate::errors::{Result, SessionError};
use crate::session::{CallSession, SessionInput};
use crate::signaling::{SignalKind, SignalMessage, SignalPayload};
use crate::types::{SessionId, UserInfo};

impl EngineInner {
    /// Count, route and log one inbound message
    pub(crate) async fn handle_inbound(self: &Arc<Self>, message: SignalMessage) -> Result<()> {
        self.ensure_running()?;
        EngineCounters::bump(&self.counters.inbound_messages);

        let session_id = message.session_id.clone();
        let kind = message.kind;
        let result = self.route_inbound(message).await;

        match &result {
            Ok(()) => {}
            Err(SessionError::AlreadyInCall { .. }) => {
                tracing::info!("Declined {:?} for {}: already in a call", kind, session_id);
            }
            Err(e) if e.is_anomaly() => {
                tracing::warn!("Dropped {:?} for {}: {}", kind, session_id, e);
            }
            Err(e) => {
                tracing::debug!("Inbound {:?} for {} not applied: {}", kind, session_id, e);
            }
        }
        result
    }

    pub(crate) async fn route_inbound(self: &Arc<Self>, message: SignalMessage) -> Result<()> {
        if let Err(e) = self.check_addressing(&message) {
            EngineCounters::bump(&self.counters.invalid_messages);
            return Err(e);
        }

        match message.kind {
            SignalKind::Offer => self.handle_offer(message).await,
            _ => self.handle_session_message(message).await,
        }
    }

    fn check_addressing(&self, message: &SignalMessage) -> Result<()> {
        message.validate()?;
        if message.recipient_id != *self.local_id() {
            return Err(SessionError::invalid_message(format!(
                "message for {} delivered to {}",
                message.recipient_id,
                self.local_id()
            )));
        }
        if message.sender_id == *self.local_id() {
            return Err(SessionError::invalid_message("message claims to come from the local participant"));
        }
        Ok(())
    }

    async fn handle_offer(self: &Arc<Self>, message: SignalMessage) -> Result<()> {
        let SignalMessage {
            session_id,
            sender_id,
            payload,
            user_info,
            ..
        } = message;
        let SignalPayload::Offer {
            initiator_id,
            participant_ids,
            media_kind,
        } = payload
        else {
            return Err(SessionError::invalid_message("offer without offer payload"));
        };

        let session = CallSession::incoming(
            session_id.clone(),
            self.local_id().clone(),
            initiator_id,
            participant_ids,
            media_kind,
            user_info,
        );

        let handle = match self.registry.insert(session).await {
            Ok(handle) => handle,
            Err(SessionError::DuplicateSession { session_id }) => {
                EngineCounters::bump(&self.counters.duplicate_offers);
                return Err(SessionError::DuplicateSession { session_id });
            }
            Err(busy @ SessionError::AlreadyInCall { .. }) => {
                EngineCounters::bump(&self.counters.busy_rejections);
                if self.config.reject_when_busy {
                    let reason: UserInfo = [("reason".to_string(), "busy".to_string())].into_iter().collect();
                    let reject = SignalMessage::reject(&session_id, self.local_id(), &sender_id, Some(reason));
                    self.send_best_effort(reject).await;
                }
                return Err(busy);
            }
            Err(e) => return Err(e),
        };

        let mut session = handle.lock().await;
        self.drive(&mut session, SessionInput::Offered).await
    }

    async fn handle_session_message(self: &Arc<Self>, message: SignalMessage) -> Result<()> {
        let unknown = || SessionError::UnknownSession {
            session_id: message.session_id.clone(),
        };

        let Some(handle) = self.registry.get(&message.session_id).await else {
            EngineCounters::bump(&self.counters.unknown_session_drops);
            return Err(unknown());
        };
        let mut session = handle.lock().await;

        // ending or closed sessions are never reanimated
        if !session.state().is_live() {
            EngineCounters::bump(&self.counters.unknown_session_drops);
            return Err(unknown());
        }
        if !session.is_participant(&message.sender_id) {
            return Err(SessionError::UnknownParticipant {
                session_id: message.session_id.clone(),
                participant_id: message.sender_id.clone(),
            });
        }

        let from = message.sender_id.clone();
        let input = match message.payload {
            SignalPayload::Empty => match message.kind {
                SignalKind::Accept => SessionInput::RemoteAccept { from },
                SignalKind::Reject => SessionInput::RemoteReject { from },
                SignalKind::HangUp => SessionInput::RemoteHangUp { from },
                other => return Err(SessionError::invalid_message(format!("{:?} without payload", other))),
            },
            SignalPayload::ConnectionState { participant_id, state } => {
                SessionInput::ConnectionState { participant_id, state }
            }
            SignalPayload::IceCandidate { candidate } => {
                if session.is_media_attached() {
                    return self
                        .media
                        .add_remote_candidate(session.id(), &from, &candidate)
                        .await;
                }
                tracing::trace!("Buffering candidate from {} for {}", from, message.session_id);
                session.buffer_candidate(from, candidate);
                return Ok(());
            }
            SignalPayload::Offer { .. } => {
                return Err(SessionError::invalid_message("offer routed as a session message"));
            }
        };

        self.drive(&mut session, input).await
    }

    /// Queue a message on its session's worker, spawning one if needed
    pub(crate) async fn dispatch(self: &Arc<Self>, message: SignalMessage) {
        let mut message = message;
        loop {
            let session_id = message.session_id.clone();
            let sender = self
                .workers
                .entry(session_id.clone())
                .or_insert_with(|| self.spawn_worker(session_id.clone()))
                .clone();

            match sender.send(message).await {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    // the worker exited under us; retry with a fresh one
                    self.workers.remove_if(&session_id, |_, tx| tx.same_channel(&sender));
                    message = returned;
                }
            }
        }
    }

    fn spawn_worker(self: &Arc<Self>, session_id: SessionId) -> mpsc::Sender<SignalMessage> {
        let (tx, mut rx) = mpsc::channel::<SignalMessage>(self.config.inbound_queue_capacity);
        let own = tx.downgrade();
        let engine = Arc::downgrade(self);

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                let _ = engine.handle_inbound(message).await;

                if engine.registry.get(&session_id).await.is_some() {
                    continue;
                }
                engine.workers.remove_if(&session_id, |_, tx| {
                    own.upgrade().is_some_and(|own| own.same_channel(tx))
                });
                rx.close();
                while let Some(late) = rx.recv().await {
                    let _ = engine.handle_inbound(late).await;
                }
                break;
            }
            tracing::trace!("Inbound worker for {} finished", session_id);
        });

        tx
    }
}

impl SignalingEngine {
    /// Start receiving from the signal channel
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.shut_down.load(Ordering::SeqCst) {
            return Err(SessionError::config("engine has been shut down"));
        }

        let mut task = inner.inbound_task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        let mut incoming = inner
            .channel
            .incoming()
            .await
            .ok_or_else(|| SessionError::config("signal channel inbound stream was already taken"))?;

        let engine = Arc::downgrade(inner);
        let local_id = inner.local_id().clone();
        *task = Some(tokio::spawn(async move {
            while let Some(message) = incoming.recv().await {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                engine.dispatch(message).await;
            }
            tracing::debug!("Inbound loop for {} finished", local_id);
        }));

        tracing::info!("Signaling engine for {} started", inner.local_id());
        Ok(())
    }

    /// Apply one inbound message directly, bypassing the receive loop
    ///
    /// Anomalies (`UnknownSession`, `UnknownParticipant`, `InvalidMessage`,
    /// `DuplicateSession`) are returned for inspection but never affect any
    /// session. A busy Offer returns `AlreadyInCall`.
    pub async fn handle_inbound(&self, message: SignalMessage) -> Result<()> {
        self.inner.handle_inbound(message).await
    }
}
