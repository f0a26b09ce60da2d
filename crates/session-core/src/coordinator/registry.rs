//! Session Registry
//!
//! Owns every live [`CallSession`] behind its own mutex and enforces that the
//! local participant holds at most one non-terminal session. Ids of removed
//! sessions are remembered (up to a bound) so that a closed session is never
//! recreated from a late or replayed Offer.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::errors::{Result, SessionError};
use crate::session::CallSession;
use crate::types::{ParticipantId, SessionId};

/// Shared handle to one registered session
pub type SessionHandle = Arc<Mutex<CallSession>>;

/// Registry totals
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_created: usize,
    pub total_closed: usize,
    pub active: usize,
}

#[derive(Debug, Default)]
struct RegistryInner {
    sessions: HashMap<SessionId, SessionHandle>,
    /// Local participant -> the session it currently owns
    by_participant: HashMap<ParticipantId, SessionId>,
    retired: HashSet<SessionId>,
    retired_order: VecDeque<SessionId>,
    total_created: usize,
    total_closed: usize,
}

impl RegistryInner {
    fn retire(&mut self, session_id: SessionId, capacity: usize) {
        if capacity == 0 || !self.retired.insert(session_id.clone()) {
            return;
        }
        self.retired_order.push_back(session_id);
        while self.retired_order.len() > capacity {
            if let Some(oldest) = self.retired_order.pop_front() {
                self.retired.remove(&oldest);
            }
        }
    }
}

/// Registry of live call sessions
#[derive(Debug)]
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
    retired_capacity: usize,
}

impl SessionRegistry {
    pub fn new(retired_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            retired_capacity,
        }
    }

    /// Register a session; its local participant must not own another one
    pub async fn insert(&self, session: CallSession) -> Result<SessionHandle> {
        let mut inner = self.inner.write().await;

        let session_id = session.id().clone();
        if inner.sessions.contains_key(&session_id) || inner.retired.contains(&session_id) {
            return Err(SessionError::DuplicateSession { session_id });
        }

        let owner = session.local_id().clone();
        if let Some(existing) = inner.by_participant.get(&owner) {
            return Err(SessionError::AlreadyInCall {
                participant_id: owner,
                session_id: existing.clone(),
            });
        }

        let handle = Arc::new(Mutex::new(session));
        inner.sessions.insert(session_id.clone(), handle.clone());
        inner.by_participant.insert(owner, session_id.clone());
        inner.total_created += 1;

        tracing::debug!("Registered session: {}", session_id);
        Ok(handle)
    }

    pub async fn get(&self, session_id: &SessionId) -> Option<SessionHandle> {
        self.inner.read().await.sessions.get(session_id).cloned()
    }

    /// Remove a session and remember its id; returns whether it was registered
    pub async fn remove(&self, session_id: &SessionId) -> bool {
        let mut inner = self.inner.write().await;

        let Some(_) = inner.sessions.remove(session_id) else {
            return false;
        };
        inner.by_participant.retain(|_, owned| owned != session_id);
        inner.total_closed += 1;
        inner.retire(session_id.clone(), self.retired_capacity);

        tracing::debug!("Unregistered session: {}", session_id);
        true
    }

    /// Drop a session that never became visible, e.g. after its Offer failed to send
    pub async fn discard(&self, session_id: &SessionId) -> bool {
        let mut inner = self.inner.write().await;

        if inner.sessions.remove(session_id).is_none() {
            return false;
        }
        inner.by_participant.retain(|_, owned| owned != session_id);
        inner.total_created = inner.total_created.saturating_sub(1);
        true
    }

    /// The non-terminal session owned by `participant_id`, if any
    pub async fn active_session_for(&self, participant_id: &ParticipantId) -> Option<SessionId> {
        self.inner.read().await.by_participant.get(participant_id).cloned()
    }

    pub async fn is_retired(&self, session_id: &SessionId) -> bool {
        self.inner.read().await.retired.contains(session_id)
    }

    pub async fn session_ids(&self) -> Vec<SessionId> {
        self.inner.read().await.sessions.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.sessions.is_empty()
    }

    pub async fn stats(&self) -> RegistryStats {
        let inner = self.inner.read().await;
        RegistryStats {
            total_created: inner.total_created,
            total_closed: inner.total_closed,
            active: inner.sessions.len(),
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(4096)
    }
}
