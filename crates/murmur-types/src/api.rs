use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Role;

// -- JWT Claims --

/// Capability token payload. Identity and role are only ever read from here,
/// never from request bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub handle: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub token: String,
    pub role: Role,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub handle: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub role: Role,
    pub handle: String,
}

// -- Messages --

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitMessageResponse {
    pub id: Uuid,
    pub key: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RespondTextRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

// -- Playback --

#[derive(Debug, Serialize, Deserialize)]
pub struct PlaybackUrlResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SignedBlobQuery {
    pub expires: i64,
    pub signature: String,
}
