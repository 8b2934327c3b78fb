//! Blob storage for audio payloads.
//!
//! The rest of the system treats keys as opaque: they come out of `put` and
//! are handed back to `signed_get_url` and `delete` unchanged.

pub mod local;
pub mod signing;

use std::time::{Duration, SystemTime};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub use local::LocalBlobStore;
pub use signing::UrlSigner;

/// How a blob delete went. Callers log this; they never branch on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
    Failed(String),
}

/// A blob present in the store, as seen by the orphan sweeper.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub key: String,
    pub modified: SystemTime,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Durably store `bytes` and return the key that now addresses them.
    async fn put(&self, bytes: Bytes, content_type: &str) -> Result<String>;

    /// A retrieval URL for `key` that stops working after `ttl`.
    async fn signed_get_url(&self, key: &str, ttl: Duration) -> Result<String>;

    /// Remove a blob. Deleting a missing key is `AlreadyAbsent`, not a failure.
    async fn delete(&self, key: &str) -> DeleteOutcome;

    /// Every blob currently held.
    async fn list(&self) -> Result<Vec<StoredBlob>>;
}

/// File extension used for a given audio MIME type. Unknown subtypes fall
/// back to `m4a`, which is what mobile recorders produce by default.
pub fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        "audio/webm" => "webm",
        "audio/aac" => "aac",
        "audio/3gpp" => "3gp",
        _ => "m4a",
    }
}

/// Inverse of [`extension_for`], used when serving a blob back.
pub fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("webm") => "audio/webm",
        Some("aac") => "audio/aac",
        Some("3gp") => "audio/3gpp",
        Some("m4a") => "audio/mp4",
        _ => "application/octet-stream",
    }
}
