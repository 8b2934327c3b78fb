use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use tokio_util::io::ReaderStream;
use tracing::error;

use murmur_storage::{LocalBlobStore, content_type_for};
use murmur_types::api::{Claims, PlaybackUrlResponse, SignedBlobQuery};

use crate::error::ServiceError;
use crate::state::AppState;

/// GET /playback-url/{*key}: signed, time-limited URL for a blob key.
pub async fn playback_url(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ServiceError> {
    let url = state.messages.playback_url(&key).await?;
    Ok(Json(PlaybackUrlResponse { url }))
}

/// GET /blobs/{*key}?expires=..&signature=..: serve a blob to whoever holds
/// a valid signed URL. No bearer token; the signature is the credential.
pub async fn serve_blob(
    State(store): State<Arc<LocalBlobStore>>,
    Path(key): Path<String>,
    Query(query): Query<SignedBlobQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let (file, len) = store
        .open_signed(&key, query.expires, &query.signature)
        .await
        .map_err(|e| {
            error!("Failed to open blob {}: {}", key, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::FORBIDDEN)?;

    // Caches must not keep the bytes past the URL's own expiry.
    let max_age = (query.expires - Utc::now().timestamp()).max(0);

    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&key).to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
            (header::CACHE_CONTROL, format!("private, max-age={}", max_age)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    ))
}
