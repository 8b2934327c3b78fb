use axum::{
    Extension, Json,
    extract::{
        Multipart, Path, State,
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use murmur_types::api::{Claims, OkResponse, RespondTextRequest, SubmitMessageResponse};

use crate::error::ServiceError;
use crate::lifecycle::AudioUpload;
use crate::state::AppState;

/// Multipart field carrying the recording.
const AUDIO_FIELD: &str = "audio";

/// An id that is not a UUID cannot name a stored message.
fn message_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ServiceError> {
    path.map(|Path(id)| id).map_err(|e| {
        debug!("Unparseable message id: {}", e.body_text());
        ServiceError::NotFound
    })
}

/// Pull the `audio` part out of a multipart body.
async fn read_audio(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<AudioUpload, ServiceError> {
    let mut multipart = multipart.map_err(|e| {
        debug!("Rejected upload: {}", e.body_text());
        ServiceError::bad_input("Expected a multipart audio upload")
    })?;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        debug!("Malformed multipart field: {}", e.body_text());
        ServiceError::bad_input("Malformed upload")
    })? {
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| {
            debug!("Unreadable audio field: {}", e.body_text());
            ServiceError::bad_input("Malformed upload")
        })?;
        debug!("Received {} bytes of {}", bytes.len(), content_type);
        return Ok(AudioUpload {
            bytes,
            content_type,
        });
    }
    Err(ServiceError::bad_input("No audio file provided"))
}

/// POST /messages: record a new voice message for the caller.
pub async fn submit_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let upload = read_audio(multipart).await?;
    let message = state
        .messages
        .submit_message(claims.sub, &claims.username, upload)
        .await?;

    let key = message.audio_key.unwrap_or_default();
    // The message is already stored; a URL is a convenience for the client.
    let url = state.messages.playback_url(&key).await.ok();

    Ok((
        StatusCode::CREATED,
        Json(SubmitMessageResponse {
            id: message.id,
            key,
            url,
        }),
    ))
}

/// GET /messages: the caller's messages, or every message for moderators.
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ServiceError> {
    let messages = state.messages.list_messages(claims.sub, claims.role).await?;
    Ok(Json(messages))
}

/// POST /messages/{id}/respond-audio: moderator voice reply.
pub async fn respond_audio(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    Extension(claims): Extension<Claims>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let message_id = message_id(path)?;
    let upload = read_audio(multipart).await?;
    state
        .messages
        .respond_with_audio(&claims, message_id, upload)
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

/// POST /messages/{id}/respond-text: moderator written reply.
pub async fn respond_text(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<RespondTextRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let message_id = message_id(path)?;
    let Json(req) = body?;
    state
        .messages
        .respond_with_text(&claims, message_id, &req.text)
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

/// DELETE /messages/{id}: owner removes a message and its audio.
pub async fn delete_message(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ServiceError> {
    let message_id = message_id(path)?;
    state.messages.delete_message(claims.sub, message_id).await?;
    Ok(Json(OkResponse { ok: true }))
}
