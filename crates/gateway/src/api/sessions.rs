//! Session administration endpoints.
//!
//! - `GET    /v1/sessions/:key`        — metadata snapshot
//! - `POST   /v1/sessions/:key/reset`  — clear history, keep memory zone
//! - `DELETE /v1/sessions/:key/memory` — clear the memory zone
//! - `DELETE /v1/sessions/:key`        — destroy the session

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::error::ApiError;
use crate::state::AppState;

fn not_found(session_key: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": {
                "message": format!("no session for key \"{session_key}\""),
                "type": "invalid_request_error",
                "code": "session_not_found",
            }
        })),
    )
        .into_response()
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> Response {
    match state.store.get(&session_key).await {
        Ok(Some(session)) => Json(serde_json::json!({
            "session_id": session.session_id,
            "user_id": session.user_id,
            "turn_count": session.history.turn_count(),
            "message_count": session.history.len(),
            "estimated_tokens": session.history.estimated_tokens(),
            "memory_zone_entries": session.memory_zone.len(),
            "created_at": session.created_at,
            "updated_at": session.updated_at,
            "total_tokens_used": session.total_tokens_used,
        }))
        .into_response(),
        Ok(None) => not_found(&session_key),
        Err(e) => ApiError::from_domain(&e).into_response(),
    }
}

pub async fn reset_session(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> Response {
    match state.store.reset(&session_key).await {
        Ok(true) => {
            tracing::info!(session_key = %session_key, "session history reset");
            Json(serde_json::json!({ "reset": true })).into_response()
        }
        Ok(false) => not_found(&session_key),
        Err(e) => ApiError::from_domain(&e).into_response(),
    }
}

pub async fn clear_memory(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> Response {
    match state.store.clear_memory(&session_key).await {
        Ok(true) => {
            tracing::info!(session_key = %session_key, "memory zone cleared");
            Json(serde_json::json!({ "cleared": true })).into_response()
        }
        Ok(false) => not_found(&session_key),
        Err(e) => ApiError::from_domain(&e).into_response(),
    }
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> Response {
    match state.store.delete(&session_key).await {
        Ok(true) => Json(serde_json::json!({ "deleted": true })).into_response(),
        Ok(false) => not_found(&session_key),
        Err(e) => ApiError::from_domain(&e).into_response(),
    }
}
