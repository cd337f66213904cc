use std::sync::Arc;

use mr_domain::config::Config;
use mr_providers::ModelRouter;
use mr_sessions::{SessionKeyPolicy, SessionStore};

use crate::runtime::session_lock::SessionLockMap;

/// Shared application state passed to all API handlers.
///
/// Everything here is immutable after startup except the session store,
/// which enforces its own concurrency discipline.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn SessionStore>,
    pub router: Arc<ModelRouter>,
    pub session_locks: Arc<SessionLockMap>,
    pub key_policy: Arc<SessionKeyPolicy>,
}
