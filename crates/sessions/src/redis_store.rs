//! Redis/Valkey-backed session store.
//!
//! Each session is one JSON blob under `session:{user_id}:{session_id}`
//! (the opaque session key is exactly `{user_id}:{session_id}`, so the
//! storage key is `session:` + the session key). The configured session
//! TTL is set natively with `SET ... EX` and refreshed on every write.
//!
//! The connection is opened lazily and shared as a multiplexed async
//! connection; a failed command drops the connection and retries once on
//! a fresh one before surfacing a store error.

use std::sync::Arc;
use std::time::Duration;

use redis::FromRedisValue;
use tokio::sync::Mutex;

use mr_domain::chat::{ConversationHistory, Message, Session};
use mr_domain::error::{Error, Result};

use crate::store::SessionStore;

const KEY_PREFIX: &str = "session";

/// Redis-backed [`SessionStore`].
pub struct RedisSessionStore {
    client: redis::Client,
    ttl: Duration,
    connection: Arc<Mutex<Option<redis::aio::MultiplexedConnection>>>,
}

impl RedisSessionStore {
    pub fn new(url: &str, ttl: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Store(format!("invalid redis url {url}: {e}")))?;
        Ok(Self {
            client,
            ttl,
            connection: Arc::new(Mutex::new(None)),
        })
    }

    fn session_key(session_key: &str) -> String {
        format!("{KEY_PREFIX}:{session_key}")
    }

    async fn ensure_connection(
        &self,
        connection: &mut Option<redis::aio::MultiplexedConnection>,
    ) -> Result<()> {
        if connection.is_some() {
            return Ok(());
        }
        *connection = Some(
            self.client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| Error::Store(format!("redis connect failed: {e}")))?,
        );
        tracing::debug!("redis session store connected");
        Ok(())
    }

    /// Run one command, reconnecting once if the shared connection has
    /// gone bad.
    async fn run_command<T, F>(&self, operation: &'static str, build: F) -> Result<T>
    where
        T: FromRedisValue + Send,
        F: Fn() -> redis::Cmd,
    {
        let mut last_err = None;
        for attempt in 0..2 {
            let mut conn_guard = self.connection.lock().await;
            self.ensure_connection(&mut conn_guard).await?;
            let conn = conn_guard
                .as_mut()
                .ok_or_else(|| Error::Store("redis connection unavailable".into()))?;
            let result: redis::RedisResult<T> = build().query_async(conn).await;
            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        error = %e,
                        "redis command failed; reconnecting"
                    );
                    *conn_guard = None;
                    last_err = Some(Error::Store(format!("redis {operation} failed: {e}")));
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Store("redis command failed".into())))
    }

    async fn load(&self, session_key: &str) -> Result<Option<Session>> {
        let key = Self::session_key(session_key);
        let payload = self
            .run_command::<Option<String>, _>("get", || {
                let mut cmd = redis::cmd("GET");
                cmd.arg(&key);
                cmd
            })
            .await?;

        match payload {
            Some(json) => {
                let session = serde_json::from_str(&json)
                    .map_err(|e| Error::Store(format!("corrupt session payload: {e}")))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Persist the session and refresh its native TTL.
    async fn save(&self, session_key: &str, session: &Session) -> Result<()> {
        let key = Self::session_key(session_key);
        let payload = serde_json::to_string(session)?;
        let ttl_secs = self.ttl.as_secs().max(1);

        self.run_command::<(), _>("set", || {
            let mut cmd = redis::cmd("SET");
            cmd.arg(&key).arg(&payload).arg("EX").arg(ttl_secs);
            cmd
        })
        .await
    }

    /// Load-mutate-save helper. Mutating calls for one session key run
    /// under the orchestrator's per-session lock, so the read-modify-write
    /// is not racing itself.
    async fn update(
        &self,
        session_key: &str,
        user_id: &str,
        mutate: impl FnOnce(&mut Session),
    ) -> Result<Session> {
        let mut session = self
            .load(session_key)
            .await?
            .unwrap_or_else(|| Session::new(user_id));
        mutate(&mut session);
        self.save(session_key, &session).await?;
        Ok(session)
    }
}

#[async_trait::async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, session_key: &str) -> Result<Option<Session>> {
        self.load(session_key).await
    }

    async fn put(&self, session_key: &str, session: &Session) -> Result<()> {
        let mut stored = session.clone();
        stored.touch();
        self.save(session_key, &stored).await
    }

    async fn append_message(
        &self,
        session_key: &str,
        user_id: &str,
        message: Message,
    ) -> Result<Session> {
        self.update(session_key, user_id, |session| session.append(message))
            .await
    }

    async fn replace_history(
        &self,
        session_key: &str,
        user_id: &str,
        messages: Vec<Message>,
    ) -> Result<Session> {
        self.update(session_key, user_id, |session| {
            session.history = ConversationHistory::from_messages(messages);
            session.touch();
        })
        .await
    }

    async fn append_memory(&self, session_key: &str, summary: String) -> Result<()> {
        if let Some(mut session) = self.load(session_key).await? {
            session.memory_zone.push(summary);
            session.touch();
            self.save(session_key, &session).await?;
        }
        Ok(())
    }

    async fn reset(&self, session_key: &str) -> Result<bool> {
        match self.load(session_key).await? {
            Some(mut session) => {
                session.reset();
                self.save(session_key, &session).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear_memory(&self, session_key: &str) -> Result<bool> {
        match self.load(session_key).await? {
            Some(mut session) => {
                session.memory_zone.clear();
                session.touch();
                self.save(session_key, &session).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, session_key: &str) -> Result<bool> {
        let key = Self::session_key(session_key);
        let removed = self
            .run_command::<i64, _>("del", || {
                let mut cmd = redis::cmd("DEL");
                cmd.arg(&key);
                cmd
            })
            .await?;
        Ok(removed > 0)
    }

    async fn ping(&self) -> Result<()> {
        self.run_command::<String, _>("ping", || redis::cmd("PING"))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_embeds_session_key() {
        assert_eq!(
            RedisSessionStore::session_key("alice:42"),
            "session:alice:42"
        );
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(RedisSessionStore::new("not-a-url", Duration::from_secs(60)).is_err());
    }
}
