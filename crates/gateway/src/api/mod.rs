pub mod chat;
pub mod health;
pub mod models;
pub mod sessions;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/v1/models", get(models::list_models))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/sessions/:key", get(sessions::get_session))
        .route("/v1/sessions/:key", delete(sessions::delete_session))
        .route("/v1/sessions/:key/reset", post(sessions::reset_session))
        .route("/v1/sessions/:key/memory", delete(sessions::clear_memory))
}
