//! Message lifecycle: submit, list, respond, delete.
//!
//! This is the only place that touches both the repository and the blob
//! store. The ordering rules it follows:
//!
//! - a blob is stored before any row references it;
//! - a response clears the row's reference to the original recording before
//!   that recording is deleted;
//! - a deleted message has its blobs removed first, then its row;
//! - blob deletes are best-effort and never fail the enclosing operation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use murmur_db::Database;
use murmur_db::models::{MessageRow, NewMessage, ResponseContent, ResponseWrite};
use murmur_storage::{BlobStore, DeleteOutcome};
use murmur_types::api::Claims;
use murmur_types::models::{Message, Role};

use crate::auth::require_moderator;
use crate::calls::{CallFailure, blob_call, db_call};
use crate::error::ServiceError;

/// 5 MB upload limit for voice recordings
pub const MAX_AUDIO_BYTES: usize = 5 * 1024 * 1024;

/// An uploaded recording before it reaches the blob store.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub bytes: Bytes,
    pub content_type: String,
}

impl AudioUpload {
    fn validate(&self) -> Result<(), ServiceError> {
        if self.bytes.is_empty() {
            return Err(ServiceError::bad_input("No audio file provided"));
        }
        if self.bytes.len() > MAX_AUDIO_BYTES {
            return Err(ServiceError::bad_input("Audio file exceeds 5 MB"));
        }
        if !self.content_type.to_ascii_lowercase().starts_with("audio/") {
            return Err(ServiceError::bad_input("Only audio files allowed"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Upper bound on each repository or blob store call.
    pub call_timeout: Duration,
    /// Validity of playback URLs.
    pub playback_ttl: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            playback_ttl: Duration::from_secs(3600),
        }
    }
}

pub struct MessageService {
    db: Arc<Database>,
    blobs: Arc<dyn BlobStore>,
    config: LifecycleConfig,
}

impl MessageService {
    pub fn new(db: Arc<Database>, blobs: Arc<dyn BlobStore>, config: LifecycleConfig) -> Self {
        Self { db, blobs, config }
    }

    async fn db<F, T>(&self, f: F) -> Result<T, CallFailure>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        db_call(&self.db, self.config.call_timeout, f).await
    }

    async fn store_blob(&self, upload: AudioUpload) -> Result<String, ServiceError> {
        blob_call(
            self.config.call_timeout,
            self.blobs.put(upload.bytes, &upload.content_type),
        )
        .await
        .map_err(|e| e.into_service_error("blob put failed"))
    }

    /// Best-effort blob delete. The outcome is logged; only the sweep looks
    /// at the returned flag, and only to count.
    async fn release(&self, key: &str, reason: &str) -> bool {
        let outcome = match tokio::time::timeout(self.config.call_timeout, self.blobs.delete(key)).await {
            Ok(outcome) => outcome,
            Err(_) => DeleteOutcome::Failed("timed out".into()),
        };
        match outcome {
            DeleteOutcome::Deleted => {
                debug!("Released blob {} ({})", key, reason);
                true
            }
            DeleteOutcome::AlreadyAbsent => {
                debug!("Blob {} was already absent ({})", key, reason);
                true
            }
            DeleteOutcome::Failed(e) => {
                warn!("Could not delete blob {} ({}): {}", key, reason, e);
                false
            }
        }
    }

    async fn load(&self, message_id: Uuid) -> Result<MessageRow, ServiceError> {
        let id = message_id.to_string();
        self.db(move |db| db.get_message(&id))
            .await
            .map_err(|e| e.into_service_error("message lookup failed"))?
            .ok_or(ServiceError::NotFound)
    }

    /// Store the recording, then create the row that points at it.
    pub async fn submit_message(
        &self,
        user_id: Uuid,
        username: &str,
        upload: AudioUpload,
    ) -> Result<Message, ServiceError> {
        upload.validate()?;
        let key = self.store_blob(upload).await?;

        let id = Uuid::new_v4().to_string();
        let owner = user_id.to_string();
        let name = username.to_string();
        let audio_key = key.clone();
        let inserted = self
            .db(move |db| {
                db.insert_message(&NewMessage {
                    id: &id,
                    user_id: &owner,
                    username: &name,
                    audio_key: &audio_key,
                })
            })
            .await;

        let row = match inserted {
            Ok(row) => row,
            Err(CallFailure::TimedOut) => {
                // The insert may still commit, so the blob has to stay.
                // Unreferenced leftovers are reclaimed by the orphan sweep.
                return Err(CallFailure::TimedOut.into_service_error("message insert failed"));
            }
            Err(failure) => {
                self.release(&key, "message insert failed").await;
                return Err(failure.into_service_error("message insert failed"));
            }
        };

        let message = into_message(row)?;
        info!("Message {} submitted by {}", message.id, username);
        Ok(message)
    }

    /// Moderators see every message, users only their own. Newest first.
    pub async fn list_messages(&self, caller_id: Uuid, role: Role) -> Result<Vec<Message>, ServiceError> {
        let owner = caller_id.to_string();
        let rows = self
            .db(move |db| match role {
                Role::Moderator => db.list_all_messages(),
                Role::User => db.list_messages_for_user(&owner),
            })
            .await
            .map_err(|e| e.into_service_error("message list failed"))?;

        let messages = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                row.into_message()
                    .map_err(|e| error!("Skipping corrupt message row {}: {:#}", id, e))
                    .ok()
            })
            .collect();
        Ok(messages)
    }

    pub async fn respond_with_audio(
        &self,
        caller: &Claims,
        message_id: Uuid,
        upload: AudioUpload,
    ) -> Result<Message, ServiceError> {
        require_moderator(caller)?;
        upload.validate()?;
        self.ensure_awaiting_response(message_id).await?;

        let key = self.store_blob(upload).await?;
        self.record_response(caller, message_id, ResponseContent::Audio(key))
            .await
    }

    pub async fn respond_with_text(
        &self,
        caller: &Claims,
        message_id: Uuid,
        text: &str,
    ) -> Result<Message, ServiceError> {
        require_moderator(caller)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::bad_input("Response text is empty"));
        }
        self.ensure_awaiting_response(message_id).await?;

        self.record_response(caller, message_id, ResponseContent::Text(text.to_string()))
            .await
    }

    async fn ensure_awaiting_response(&self, message_id: Uuid) -> Result<(), ServiceError> {
        if self.load(message_id).await?.responded {
            return Err(ServiceError::Conflict);
        }
        Ok(())
    }

    /// Write the response, then release the original recording the row no
    /// longer references. A lost race releases the loser's response blob.
    async fn record_response(
        &self,
        caller: &Claims,
        message_id: Uuid,
        content: ResponseContent,
    ) -> Result<Message, ServiceError> {
        let id = message_id.to_string();
        let moderator = caller.username.clone();
        let write_content = content.clone();
        let written = match self
            .db(move |db| db.update_for_response(&id, &write_content, &moderator))
            .await
        {
            Ok(written) => written,
            // As with submits, a timed-out write may still commit; the sweep
            // reclaims the blob if it does not.
            Err(CallFailure::TimedOut) => {
                return Err(CallFailure::TimedOut.into_service_error("response write failed"));
            }
            Err(failure) => {
                if let Some(key) = content.audio_key() {
                    self.release(key, "response write failed").await;
                }
                return Err(failure.into_service_error("response write failed"));
            }
        };

        let (row, released_audio_key) = match written {
            ResponseWrite::Applied {
                message,
                released_audio_key,
            } => (message, released_audio_key),
            ResponseWrite::NotFound => {
                if let Some(key) = content.audio_key() {
                    self.release(key, "message vanished before response").await;
                }
                return Err(ServiceError::NotFound);
            }
            ResponseWrite::AlreadyResponded => {
                if let Some(key) = content.audio_key() {
                    self.release(key, "lost response race").await;
                }
                return Err(ServiceError::Conflict);
            }
        };

        if let Some(key) = released_audio_key {
            self.release(&key, "original recording answered").await;
        }

        info!("Message {} responded to by {}", message_id, caller.username);
        into_message(row)
    }

    /// Owner-only hard delete. Blobs go first, then the row; the row is
    /// removed whatever happened to the blobs.
    pub async fn delete_message(&self, caller_id: Uuid, message_id: Uuid) -> Result<(), ServiceError> {
        let row = self.load(message_id).await?;
        if row.user_id != caller_id.to_string() {
            return Err(ServiceError::Forbidden);
        }

        let mut released: HashSet<String> = HashSet::new();
        for key in row.blob_keys() {
            self.release(key, "message deleted").await;
            released.insert(key.to_string());
        }

        let id = message_id.to_string();
        let deleted = self
            .db(move |db| db.delete_message(&id))
            .await
            .map_err(|e| e.into_service_error("message delete failed"))?
            .ok_or(ServiceError::NotFound)?;

        // A response may have landed between the read and the delete.
        for key in deleted.blob_keys() {
            if !released.contains(key) {
                self.release(key, "message deleted").await;
            }
        }

        info!("Message {} deleted by its owner", message_id);
        Ok(())
    }

    /// Time-limited retrieval URL for any key the caller can name.
    pub async fn playback_url(&self, key: &str) -> Result<String, ServiceError> {
        blob_call(
            self.config.call_timeout,
            self.blobs.signed_get_url(key, self.config.playback_ttl),
        )
        .await
        .map_err(|e| match e {
            CallFailure::TimedOut => ServiceError::storage("signing playback url", "timed out"),
            CallFailure::Failed(err) => {
                debug!("Refused playback url for {}: {}", key, err);
                ServiceError::bad_input("Unknown audio key")
            }
        })
    }

    /// Delete blobs that no message references and that are older than
    /// `grace`. The grace period covers blobs stored by in-flight submits
    /// and responses whose rows are not written yet.
    pub async fn sweep_orphans(&self, grace: Duration) -> Result<usize, ServiceError> {
        let stored = blob_call(self.config.call_timeout, self.blobs.list())
            .await
            .map_err(|e| e.into_service_error("blob listing failed"))?;
        let referenced = self
            .db(|db| db.referenced_blob_keys())
            .await
            .map_err(|e| e.into_service_error("referenced key query failed"))?;

        let cutoff = SystemTime::now()
            .checked_sub(grace)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut swept = 0;
        for blob in stored {
            if referenced.contains(&blob.key) || blob.modified > cutoff {
                continue;
            }
            if self.release(&blob.key, "orphaned").await {
                swept += 1;
            }
        }
        Ok(swept)
    }
}

fn into_message(row: MessageRow) -> Result<Message, ServiceError> {
    row.into_message()
        .map_err(|e| ServiceError::storage("corrupt message row", format!("{:#}", e)))
}
