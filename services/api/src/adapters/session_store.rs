//! services/api/src/adapters/session_store.rs
//!
//! An in-memory implementation of the `SessionStore` port. Sessions are
//! ephemeral: they live only as long as the process and expire after a period
//! of inactivity.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use study_gate_core::domain::Session;
use study_gate_core::ports::{PortResult, SessionChange, SessionStore};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: Uuid) -> PortResult<Option<Session>> {
        let cutoff = Utc::now() - self.ttl;
        {
            let sessions = self.sessions.read().await;
            match sessions.get(&session_id) {
                Some(session) if session.last_accessed_at > cutoff => {
                    return Ok(Some(session.clone()))
                }
                None => return Ok(None),
                Some(_) => {}
            }
        }

        debug!(%session_id, "Session expired");
        self.sessions.write().await.remove(&session_id);
        Ok(None)
    }

    async fn save(&self, mut session: Session) -> PortResult<()> {
        let now = Utc::now();
        session.last_accessed_at = now;
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(&session.id) {
            // New sessions are rare enough to pay for sweeping abandoned ones.
            let cutoff = now - self.ttl;
            let before = sessions.len();
            sessions.retain(|_, s| s.last_accessed_at > cutoff);
            if sessions.len() < before {
                debug!(purged = before - sessions.len(), "Expired sessions purged");
            }
        }
        sessions.insert(session.id, session);
        Ok(())
    }

    async fn update(&self, session_id: Uuid, change: SessionChange) -> PortResult<bool> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session_id) {
            Some(session) if session.last_accessed_at > now - self.ttl => {
                change(session);
                session.last_accessed_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, session_id: Uuid) -> PortResult<()> {
        self.sessions.write().await.remove(&session_id);
        Ok(())
    }
}
