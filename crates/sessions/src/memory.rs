//! In-process session store.
//!
//! A `RwLock<HashMap>` keyed by session key, plus a TTL sweep the
//! gateway drives on an interval. Suitable for single-instance
//! deployments; multi-instance deployments use the Redis backend.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;

use mr_domain::chat::{Message, Session};
use mr_domain::error::Result;
use mr_domain::trace::TraceEvent;

use crate::store::SessionStore;

/// Map-backed [`SessionStore`] with TTL eviction.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sessions (for `/health` and tests).
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Evict sessions whose `updated_at + ttl` is in the past, emitting
    /// one `session_expired` event per eviction. Returns the eviction
    /// count. The gateway calls this on an interval.
    pub fn sweep_expired(&self, ttl: Duration) -> usize {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);

        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|session_key, session| {
            let idle = now.signed_duration_since(session.updated_at);
            if idle <= ttl {
                return true;
            }
            TraceEvent::SessionExpired {
                correlation_id: uuid::Uuid::new_v4().to_string(),
                session_key: session_key.clone(),
                idle_secs: idle.num_seconds(),
            }
            .emit();
            false
        });
        before - sessions.len()
    }

    fn with_session<R>(
        &self,
        session_key: &str,
        user_id: &str,
        mutate: impl FnOnce(&mut Session) -> R,
    ) -> R {
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(session_key.to_owned())
            .or_insert_with(|| Session::new(user_id));
        mutate(session)
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_key: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().get(session_key).cloned())
    }

    async fn put(&self, session_key: &str, session: &Session) -> Result<()> {
        let mut stored = session.clone();
        stored.touch();
        self.sessions.write().insert(session_key.to_owned(), stored);
        Ok(())
    }

    async fn append_message(
        &self,
        session_key: &str,
        user_id: &str,
        message: Message,
    ) -> Result<Session> {
        Ok(self.with_session(session_key, user_id, |session| {
            session.append(message);
            session.clone()
        }))
    }

    async fn replace_history(
        &self,
        session_key: &str,
        user_id: &str,
        messages: Vec<Message>,
    ) -> Result<Session> {
        Ok(self.with_session(session_key, user_id, |session| {
            session.history = mr_domain::chat::ConversationHistory::from_messages(messages);
            session.touch();
            session.clone()
        }))
    }

    async fn append_memory(&self, session_key: &str, summary: String) -> Result<()> {
        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get_mut(session_key) {
            session.memory_zone.push(summary);
            session.touch();
        }
        Ok(())
    }

    async fn reset(&self, session_key: &str) -> Result<bool> {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(session_key) {
            Some(session) => {
                session.reset();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear_memory(&self, session_key: &str) -> Result<bool> {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(session_key) {
            Some(session) => {
                session.memory_zone.clear();
                session.touch();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, session_key: &str) -> Result<bool> {
        Ok(self.sessions.write().remove(session_key).is_some())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
