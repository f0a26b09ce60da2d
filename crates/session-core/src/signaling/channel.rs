//! Signal channel seam and an in-memory implementation
//!
//! A [`SignalChannel`] delivers messages to a recipient and exposes the inbound
//! stream for the local participant exactly once. [`MemorySignalHub`] routes
//! between channels living in the same process and is what the simulator and
//! the integration tests wire engines together with.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};

use crate::errors::{Result, SessionError};
use crate::signaling::message::SignalMessage;
use crate::types::ParticipantId;

/// Bidirectional signaling transport
#[async_trait]
pub trait SignalChannel: Send + Sync {
    /// Deliver a message to `message.recipient_id`
    async fn send(&self, message: SignalMessage) -> Result<()>;

    /// Hand out the inbound stream; returns `None` once it has been taken
    async fn incoming(&self) -> Option<mpsc::Receiver<SignalMessage>>;
}

/// In-process router keyed by participant id
#[derive(Debug, Clone)]
pub struct MemorySignalHub {
    routes: Arc<DashMap<ParticipantId, mpsc::Sender<SignalMessage>>>,
    capacity: usize,
}

impl MemorySignalHub {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            routes: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register `participant` and return its channel, replacing any earlier registration
    pub fn connect(&self, participant: impl Into<ParticipantId>) -> MemorySignalChannel {
        let participant = participant.into();
        let (tx, rx) = mpsc::channel(self.capacity);
        if self.routes.insert(participant.clone(), tx).is_some() {
            tracing::debug!("Replaced hub route for {}", participant);
        }
        MemorySignalChannel {
            participant,
            hub: self.clone(),
            incoming: Mutex::new(Some(rx)),
        }
    }

    /// Drop the route for `participant`; further sends to it fail
    pub fn disconnect(&self, participant: &ParticipantId) {
        self.routes.remove(participant);
    }

    pub fn is_connected(&self, participant: &ParticipantId) -> bool {
        self.routes.contains_key(participant)
    }

    async fn route(&self, message: SignalMessage) -> Result<()> {
        let sender = self
            .routes
            .get(&message.recipient_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                SessionError::transport(format!("participant {} is not reachable", message.recipient_id))
            })?;

        sender
            .send(message)
            .await
            .map_err(|e| SessionError::transport(format!("recipient {} went away", e.0.recipient_id)))
    }
}

impl Default for MemorySignalHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One participant's view of a [`MemorySignalHub`]
#[derive(Debug)]
pub struct MemorySignalChannel {
    participant: ParticipantId,
    hub: MemorySignalHub,
    incoming: Mutex<Option<mpsc::Receiver<SignalMessage>>>,
}

impl MemorySignalChannel {
    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }
}

#[async_trait]
impl SignalChannel for MemorySignalChannel {
    async fn send(&self, message: SignalMessage) -> Result<()> {
        tracing::trace!(
            "{} sending {:?} for {} to {}",
            self.participant, message.kind, message.session_id, message.recipient_id
        );
        self.hub.route(message).await
    }

    async fn incoming(&self) -> Option<mpsc::Receiver<SignalMessage>> {
        self.incoming.lock().await.take()
    }
}
