//! The session store contract.

use mr_domain::chat::{Message, Session};
use mr_domain::error::Result;

/// Keyed persistence of [`Session`] records with TTL semantics.
///
/// Reads observe a point-in-time snapshot. Writes on the same session
/// key must be issued under the orchestrator's per-session lock; a
/// backend is free to assume no two mutating calls for one key run
/// concurrently, and the resulting message order is the serialization
/// order of those calls.
///
/// Connectivity failures surface as [`mr_domain::error::Error::Store`],
/// which the orchestrator maps to a retryable 503.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a session by its key.
    async fn get(&self, session_key: &str) -> Result<Option<Session>>;

    /// Upsert a session, refreshing `updated_at` and the backend TTL.
    async fn put(&self, session_key: &str, session: &Session) -> Result<()>;

    /// Append one message, creating the session if absent. Returns the
    /// updated session.
    async fn append_message(
        &self,
        session_key: &str,
        user_id: &str,
        message: Message,
    ) -> Result<Session>;

    /// Replace the whole conversation history, creating the session if
    /// absent. The memory zone is untouched. Returns the updated session.
    async fn replace_history(
        &self,
        session_key: &str,
        user_id: &str,
        messages: Vec<Message>,
    ) -> Result<Session>;

    /// Append a summary to the session's memory zone. A no-op when the
    /// session does not exist.
    async fn append_memory(&self, session_key: &str, summary: String) -> Result<()>;

    /// Clear the history, preserving the memory zone and metadata.
    /// Returns false when the session does not exist.
    async fn reset(&self, session_key: &str) -> Result<bool>;

    /// Explicit administrator action: clear the memory zone only.
    /// Returns false when the session does not exist.
    async fn clear_memory(&self, session_key: &str) -> Result<bool>;

    /// Destroy the session entirely.
    /// Returns false when the session does not exist.
    async fn delete(&self, session_key: &str) -> Result<bool>;

    /// Backend reachability probe for `/health`.
    async fn ping(&self) -> Result<()>;
}
