//! Per-session single-flight.
//!
//! Concurrent requests for the same session key are serialized so
//! interleaved history writes cannot corrupt message order. Each key
//! maps to a `Semaphore(1)`; a second request waits for the running
//! turn to finish rather than being rejected.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use mr_domain::error::{Error, Result};

/// Manages per-session turn locks.
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the turn lock for a session, waiting for any in-flight
    /// turn to complete. The permit auto-releases on drop; hold it for
    /// the whole turn, including the streaming tail.
    pub async fn acquire(&self, session_key: &str) -> Result<OwnedSemaphorePermit> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(session_key.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        sem.acquire_owned()
            .await
            .map_err(|_| Error::Other("session lock closed".into()))
    }

    /// Number of tracked sessions (for monitoring).
    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop lock entries for sessions with no turn in flight.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_acquire_release() {
        let map = SessionLockMap::new();
        let permit = map.acquire("s1").await.unwrap();
        drop(permit);
        let permit = map.acquire("s1").await.unwrap();
        drop(permit);
    }

    #[tokio::test]
    async fn different_sessions_do_not_contend() {
        let map = SessionLockMap::new();
        let p1 = map.acquire("s1").await.unwrap();
        let p2 = map.acquire("s2").await.unwrap();
        assert_eq!(map.session_count(), 2);
        drop(p1);
        drop(p2);
    }

    #[tokio::test]
    async fn same_session_serializes() {
        let map = Arc::new(SessionLockMap::new());
        let p1 = map.acquire("s1").await.unwrap();

        let map2 = map.clone();
        let waiter = tokio::spawn(async move {
            let _p2 = map2.acquire("s1").await.unwrap();
            7
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(p1);
        assert_eq!(waiter.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let map = SessionLockMap::new();
        let _held = map.acquire("busy").await.unwrap();
        let released = map.acquire("idle").await.unwrap();
        drop(released);

        map.prune_idle();
        assert_eq!(map.session_count(), 1);
    }
}
