use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

/// Every way an auth or message operation can fail, as seen by callers.
///
/// Storage and transport details are logged where they happen and never
/// carried in here, so nothing internal leaks into a response body.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("handle is already registered")]
    DuplicateHandle,

    #[error("missing or invalid token")]
    Unauthorized,

    #[error("not allowed")]
    Forbidden,

    #[error("message not found")]
    NotFound,

    #[error("{0}")]
    BadInput(String),

    #[error("message has already been responded to")]
    Conflict,

    #[error("storage unavailable")]
    StorageUnavailable,
}

impl ServiceError {
    pub fn bad_input(msg: impl Into<String>) -> Self {
        Self::BadInput(msg.into())
    }

    /// Log an internal failure and collapse it to `StorageUnavailable`.
    pub fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, err);
        Self::StorageUnavailable
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::DuplicateHandle | Self::BadInput(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Malformed JSON bodies get the same error envelope as everything else.
impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected request body: {}", rejection.body_text());
        Self::bad_input("Malformed request body")
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
