//! Session Event System
//!
//! Simple event system using tokio::sync::broadcast. Every session transition
//! publishes exactly one [`SessionEvent`]; events for a session are published
//! while that session is locked, so subscribers observe them in transition
//! order. There is no replay: a subscriber only sees events published after it
//! subscribed.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::errors::{Result, SessionError};
use crate::types::{CloseReason, MediaKind, ParticipantId, SessionId, TrackKind, UserInfo};

/// Session lifecycle notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Local call placed: Created -> Connecting
    CallStarted {
        session_id: SessionId,
        opponents: BTreeSet<ParticipantId>,
        media_kind: MediaKind,
    },

    /// Remote call received: Created -> Ringing
    IncomingCall {
        session_id: SessionId,
        initiator_id: ParticipantId,
        participant_ids: BTreeSet<ParticipantId>,
        media_kind: MediaKind,
        user_info: Option<UserInfo>,
    },

    /// Ringing -> Connecting, `by` is whoever accepted
    CallAccepted {
        session_id: SessionId,
        by: ParticipantId,
    },

    /// A participant's connection came up (Connecting -> Active for the first one)
    SessionConnected {
        session_id: SessionId,
        participant_id: ParticipantId,
    },

    /// The media engine reported a remote track for a connected participant
    RemoteTrackAvailable {
        session_id: SessionId,
        participant_id: ParticipantId,
        track: TrackKind,
    },

    /// An opponent declined while the call goes on with others
    ParticipantRejected {
        session_id: SessionId,
        participant_id: ParticipantId,
    },

    /// A non-initiator participant left the call
    RemoteParticipantLeft {
        session_id: SessionId,
        participant_id: ParticipantId,
    },

    /// Local cleanup started
    SessionEnding {
        session_id: SessionId,
        reason: CloseReason,
    },

    /// The session reached a terminal state and was removed from the registry
    SessionClosed {
        session_id: SessionId,
        reason: CloseReason,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            SessionEvent::CallStarted { session_id, .. }
            | SessionEvent::IncomingCall { session_id, .. }
            | SessionEvent::CallAccepted { session_id, .. }
            | SessionEvent::SessionConnected { session_id, .. }
            | SessionEvent::RemoteTrackAvailable { session_id, .. }
            | SessionEvent::ParticipantRejected { session_id, .. }
            | SessionEvent::RemoteParticipantLeft { session_id, .. }
            | SessionEvent::SessionEnding { session_id, .. }
            | SessionEvent::SessionClosed { session_id, .. } => session_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::CallStarted { .. } => "call_started",
            SessionEvent::IncomingCall { .. } => "incoming_call",
            SessionEvent::CallAccepted { .. } => "call_accepted",
            SessionEvent::SessionConnected { .. } => "session_connected",
            SessionEvent::RemoteTrackAvailable { .. } => "remote_track_available",
            SessionEvent::ParticipantRejected { .. } => "participant_rejected",
            SessionEvent::RemoteParticipantLeft { .. } => "remote_participant_left",
            SessionEvent::SessionEnding { .. } => "session_ending",
            SessionEvent::SessionClosed { .. } => "session_closed",
        }
    }
}

/// Subscriber wrapper for session events
pub struct EventSubscriber {
    receiver: broadcast::Receiver<SessionEvent>,
}

impl EventSubscriber {
    fn new(receiver: broadcast::Receiver<SessionEvent>) -> Self {
        Self { receiver }
    }

    /// Receive the next event
    pub async fn receive(&mut self) -> Result<SessionEvent> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(skipped) => {
                SessionError::event_stream(format!("subscriber lagged, {} events skipped", skipped))
            }
            broadcast::error::RecvError::Closed => SessionError::event_stream("event bus closed"),
        })
    }

    /// Try to receive an event without blocking
    pub fn try_receive(&mut self) -> Result<Option<SessionEvent>> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(e) => Err(SessionError::event_stream(format!("failed to receive event: {}", e))),
        }
    }
}

/// Single-producer, multi-subscriber bus for session events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to whoever is currently subscribed
    pub fn publish(&self, event: SessionEvent) {
        match &event {
            SessionEvent::SessionClosed { session_id, reason } => {
                tracing::info!("Session {} closed: {:?}", session_id, reason);
            }
            SessionEvent::IncomingCall { session_id, initiator_id, .. } => {
                tracing::info!("Incoming call {} from {}", session_id, initiator_id);
            }
            other => {
                tracing::debug!("Publishing {} for session {}", other.name(), other.session_id());
            }
        }

        if self.sender.send(event).is_err() {
            tracing::debug!("No subscribers listening for event, but this is acceptable");
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(id: &str) -> SessionEvent {
        SessionEvent::SessionClosed {
            session_id: SessionId::from(id),
            reason: CloseReason::Timeout,
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_events_in_order() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let connected = SessionEvent::SessionConnected {
            session_id: SessionId::from("s1"),
            participant_id: ParticipantId::from("bob"),
        };
        bus.publish(connected.clone());
        bus.publish(closed("s1"));

        for subscriber in [&mut first, &mut second] {
            assert_eq!(subscriber.receive().await.unwrap(), connected);
            assert_eq!(subscriber.receive().await.unwrap(), closed("s1"));
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = EventBus::new(16);
        bus.publish(closed("s1"));

        let mut late = bus.subscribe();
        assert_eq!(late.try_receive().unwrap(), None);

        bus.publish(closed("s2"));
        assert_eq!(late.receive().await.unwrap().session_id(), &SessionId::from("s2"));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_gets_event_stream_error() {
        let bus = EventBus::new(2);
        let mut slow = bus.subscribe();
        for i in 0..5 {
            bus.publish(closed(&format!("s{}", i)));
        }
        assert!(matches!(slow.receive().await, Err(SessionError::EventStream { .. })));
        // the subscriber resumes with the oldest retained event
        assert!(slow.receive().await.is_ok());
    }
}
