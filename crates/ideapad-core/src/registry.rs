//! Session registry
//!
//! Maps conversation identifiers to live sessions. Every mutation happens
//! under a single write guard, so a concurrent reader sees an entry either
//! fully present or fully gone. The registry holds reference slots only:
//! removing an entry never releases the engine, the caller shuts it down.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::session::ModelSession;
use crate::types::ConversationId;

/// A registered session. The mutex serializes calls on one conversation.
pub type SharedSession = Arc<Mutex<ModelSession>>;

/// Concurrency-safe conversation table
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ConversationId, SharedSession>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session under a fresh identifier.
    ///
    /// Hands the session back if the identifier is already taken, so the
    /// caller still owns (and can shut down) what it could not register.
    pub async fn insert(
        &self,
        id: ConversationId,
        session: ModelSession,
    ) -> std::result::Result<SharedSession, ModelSession> {
        let mut sessions = self.sessions.write().await;
        match sessions.entry(id) {
            Entry::Occupied(_) => Err(session),
            Entry::Vacant(slot) => {
                let shared = Arc::new(Mutex::new(session));
                slot.insert(Arc::clone(&shared));
                Ok(shared)
            }
        }
    }

    /// Get a session or fail with `ConversationNotFound`
    pub async fn lookup_or_fail(&self, id: &ConversationId) -> Result<SharedSession> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(id.to_string()))
    }

    /// Remove a session or fail with `ConversationNotFound`.
    ///
    /// Of several callers racing on the same identifier exactly one gets the
    /// session back.
    pub async fn remove_or_fail(&self, id: &ConversationId) -> Result<SharedSession> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(id)
            .ok_or_else(|| Error::not_found(id.to_string()))
    }

    pub async fn contains(&self, id: &ConversationId) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Identifiers currently registered
    pub async fn ids(&self) -> Vec<ConversationId> {
        self.sessions.read().await.keys().copied().collect()
    }

    /// Point-in-time copy of the table
    pub async fn snapshot(&self) -> Vec<(ConversationId, SharedSession)> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .map(|(id, session)| (*id, Arc::clone(session)))
            .collect()
    }

    /// Atomically empty the table and return everything that was in it
    pub async fn drain(&self) -> Vec<(ConversationId, SharedSession)> {
        let mut sessions = self.sessions.write().await;
        sessions.drain().collect()
    }
}
