//! `GET /health` — liveness plus storage backend status.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use mr_domain::config::StorageBackend;

use crate::state::AppState;

/// The session-history discipline this gateway applies (see the chat
/// orchestrator): the incoming transcript replaces the stored history.
pub const SESSION_POLICY: &str = "replace";

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "storage": state.config.storage.backend.as_str(),
        "session_policy": SESSION_POLICY,
    });

    // Only an external backend has reachability worth probing.
    if state.config.storage.backend == StorageBackend::Redis {
        body["external_store_reachable"] =
            serde_json::json!(state.store.ping().await.is_ok());
    }

    Json(body)
}
