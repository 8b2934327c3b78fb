pub mod auth;
pub mod calls;
pub mod error;
pub mod lifecycle;
pub mod messages;
pub mod middleware;
pub mod playback;
pub mod state;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post},
};

use murmur_storage::LocalBlobStore;

use crate::lifecycle::MAX_AUDIO_BYTES;
use crate::middleware::require_auth;
use crate::state::AppState;

/// Room for multipart framing on top of the largest accepted recording, so
/// oversized audio reaches validation and gets a 400 instead of a 413.
const BODY_LIMIT: usize = MAX_AUDIO_BYTES + 1024 * 1024;

/// Liveness check, no auth.
pub async fn health() -> &'static str {
    "ok"
}

/// All HTTP routes. `blobs` backs the signed retrieval endpoint.
pub fn router(state: AppState, blobs: Arc<LocalBlobStore>) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(
            "/messages",
            get(messages::list_messages).post(messages::submit_message),
        )
        .route("/messages/{id}", delete(messages::delete_message))
        .route("/messages/{id}/respond-audio", post(messages::respond_audio))
        .route("/messages/{id}/respond-text", post(messages::respond_text))
        .route("/playback-url/{*key}", get(playback::playback_url))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state);

    let blob_routes = Router::new()
        .route("/blobs/{*key}", get(playback::serve_blob))
        .with_state(blobs);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(blob_routes)
}
