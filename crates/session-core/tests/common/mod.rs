//! Shared test doubles and helpers for the integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use vcall_session_core::prelude::*;
use vcall_session_core::{MemorySignalChannel, SignalKind};

/// How long helpers wait for something that should happen promptly
pub const EVENT_WAIT: Duration = Duration::from_secs(5);

pub fn pid(id: &str) -> ParticipantId {
    ParticipantId::from(id)
}

pub fn user_info(pairs: &[(&str, &str)]) -> UserInfo {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Channel that records everything sent and lets tests inject inbound messages
pub struct RecordingChannel {
    sent: StdMutex<Vec<SignalMessage>>,
    unreachable: StdMutex<HashSet<ParticipantId>>,
    fail_all: AtomicBool,
    inbound_tx: mpsc::Sender<SignalMessage>,
    inbound_rx: Mutex<Option<mpsc::Receiver<SignalMessage>>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        Arc::new(Self {
            sent: StdMutex::new(Vec::new()),
            unreachable: StdMutex::new(HashSet::new()),
            fail_all: AtomicBool::new(false),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
        })
    }

    pub fn sent(&self) -> Vec<SignalMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn take_sent(&self) -> Vec<SignalMessage> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn sent_of_kind(&self, kind: SignalKind) -> Vec<SignalMessage> {
        self.sent().into_iter().filter(|m| m.kind == kind).collect()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn make_unreachable(&self, participant: &str) {
        self.unreachable.lock().unwrap().insert(pid(participant));
    }

    pub fn make_reachable(&self, participant: &str) {
        self.unreachable.lock().unwrap().remove(&pid(participant));
    }

    /// Deliver a message as if it arrived from the network
    pub async fn inject(&self, message: SignalMessage) {
        self.inbound_tx.send(message).await.unwrap();
    }
}

#[async_trait]
impl SignalChannel for RecordingChannel {
    async fn send(&self, message: SignalMessage) -> Result<()> {
        if self.fail_all.load(Ordering::SeqCst) || self.unreachable.lock().unwrap().contains(&message.recipient_id) {
            return Err(SessionError::transport(format!("{} unreachable", message.recipient_id)));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn incoming(&self) -> Option<mpsc::Receiver<SignalMessage>> {
        self.inbound_rx.lock().await.take()
    }
}

/// One call made on the media provider
#[derive(Debug, Clone, PartialEq)]
pub enum MediaCall {
    Attach(SessionId, MediaKind),
    Detach(SessionId),
    Candidate(SessionId, ParticipantId, String),
}

#[derive(Default)]
pub struct RecordingMediaProvider {
    calls: StdMutex<Vec<MediaCall>>,
}

impl RecordingMediaProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<MediaCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaProvider for RecordingMediaProvider {
    async fn attach(&self, session_id: &SessionId, media_kind: MediaKind, _config: &MediaConfig) -> Result<()> {
        self.calls.lock().unwrap().push(MediaCall::Attach(session_id.clone(), media_kind));
        Ok(())
    }

    async fn detach(&self, session_id: &SessionId) -> Result<()> {
        self.calls.lock().unwrap().push(MediaCall::Detach(session_id.clone()));
        Ok(())
    }

    async fn add_remote_candidate(
        &self,
        session_id: &SessionId,
        from: &ParticipantId,
        candidate: &IceCandidate,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(MediaCall::Candidate(
            session_id.clone(),
            from.clone(),
            candidate.candidate.clone(),
        ));
        Ok(())
    }
}

/// Engine wired to a recording channel and media provider; not started
pub struct TestPeer {
    pub engine: SignalingEngine,
    pub channel: Arc<RecordingChannel>,
    pub media: Arc<RecordingMediaProvider>,
}

impl TestPeer {
    pub fn new(local: &str) -> Self {
        Self::with_timeout(local, Duration::from_secs(45))
    }

    pub fn with_timeout(local: &str, answer_timeout: Duration) -> Self {
        let channel = RecordingChannel::new();
        let media = RecordingMediaProvider::new();
        let engine = SignalingEngine::builder()
            .with_local_participant(local)
            .with_answer_timeout(answer_timeout)
            .with_channel(channel.clone())
            .with_media_provider(media.clone())
            .build()
            .unwrap();
        Self { engine, channel, media }
    }

    pub async fn state(&self, session_id: &SessionId) -> Option<CallState> {
        self.engine.session(session_id).await.map(|s| s.state())
    }
}

/// Started engine connected to a shared hub
pub async fn hub_peer(hub: &MemorySignalHub, local: &str) -> SignalingEngine {
    let channel: Arc<MemorySignalChannel> = Arc::new(hub.connect(local));
    let engine = SignalingEngine::builder()
        .with_local_participant(local)
        .with_channel(channel)
        .build()
        .unwrap();
    engine.start().await.unwrap();
    engine
}

pub fn offer_from(session: &SessionId, initiator: &str, to: &str, participants: &[&str]) -> SignalMessage {
    SignalMessage::offer(
        session,
        &pid(initiator),
        &pid(to),
        participants.iter().map(|p| pid(p)).collect(),
        MediaKind::AudioVideo,
        None,
    )
}

pub async fn next_event(events: &mut EventSubscriber) -> SessionEvent {
    tokio::time::timeout(EVENT_WAIT, events.receive())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream failed")
}

/// Skip events until one matches
pub async fn wait_for<F>(events: &mut EventSubscriber, mut matches: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    loop {
        let event = next_event(events).await;
        if matches(&event) {
            return event;
        }
    }
}

pub async fn wait_for_closed(events: &mut EventSubscriber, session_id: &SessionId) -> CloseReason {
    match wait_for(events, |e| matches!(e, SessionEvent::SessionClosed { session_id: id, .. } if id == session_id)).await {
        SessionEvent::SessionClosed { reason, .. } => reason,
        other => unreachable!("unexpected {:?}", other),
    }
}

/// Drain whatever is already queued
pub fn drain(events: &mut EventSubscriber) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(Some(event)) = events.try_receive() {
        out.push(event);
    }
    out
}

/// Relay everything `from` has sent to `to` through the JSON codec, returning the kinds delivered
pub async fn relay(from: &TestPeer, to: &TestPeer) -> Vec<SignalKind> {
    let mut kinds = Vec::new();
    for message in from.channel.take_sent() {
        if message.recipient_id != *to.engine.local_participant() {
            continue;
        }
        let wire = message.to_json().unwrap();
        let decoded = SignalMessage::from_json(&wire).unwrap();
        assert_eq!(decoded, message);
        kinds.push(decoded.kind);
        to.engine.handle_inbound(decoded).await.unwrap();
    }
    kinds
}
