//! Shared fixtures: an in-memory repository, a temp-dir blob store, and a
//! moderator plus two users.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;

use murmur_api::auth::Authenticator;
use murmur_api::lifecycle::{AudioUpload, LifecycleConfig, MessageService};
use murmur_api::state::{AppState, AppStateInner};
use murmur_db::Database;
use murmur_storage::{BlobStore, DeleteOutcome, LocalBlobStore, StoredBlob, UrlSigner};
use murmur_types::api::Claims;

pub const PUBLIC_URL: &str = "http://localhost:3000";

pub struct Fixture {
    pub state: AppState,
    pub db: Arc<Database>,
    pub local: Arc<LocalBlobStore>,
    pub moderator: Claims,
    pub moderator_token: String,
    pub alice: Claims,
    pub alice_token: String,
    pub bob: Claims,
    pub bob_token: String,
    _dir: TempDir,
}

/// Wraps the local store but fails every delete.
pub struct FailingDeletes {
    pub inner: Arc<LocalBlobStore>,
}

#[async_trait]
impl BlobStore for FailingDeletes {
    async fn put(&self, bytes: Bytes, content_type: &str) -> Result<String> {
        self.inner.put(bytes, content_type).await
    }

    async fn signed_get_url(&self, key: &str, ttl: Duration) -> Result<String> {
        self.inner.signed_get_url(key, ttl).await
    }

    async fn delete(&self, _key: &str) -> DeleteOutcome {
        DeleteOutcome::Failed("injected failure".into())
    }

    async fn list(&self) -> Result<Vec<StoredBlob>> {
        self.inner.list().await
    }
}

pub async fn setup() -> Fixture {
    setup_with(|local| local as Arc<dyn BlobStore>).await
}

/// Build a fixture whose lifecycle service talks to `wrap(local store)`.
pub async fn setup_with<F>(wrap: F) -> Fixture
where
    F: FnOnce(Arc<LocalBlobStore>) -> Arc<dyn BlobStore>,
{
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open_in_memory().unwrap());
    let local = Arc::new(
        LocalBlobStore::new(dir.path().to_path_buf(), PUBLIC_URL, UrlSigner::new("blob-secret"))
            .await
            .unwrap(),
    );

    let auth = Authenticator::new(db.clone(), "jwt-secret".into(), Duration::from_secs(5));
    assert!(auth.seed_moderator("admin", "admin123").await.unwrap());
    let moderator = auth.authenticate("admin", "admin123").await.unwrap();
    let alice = auth.register(Some("Alice"), "alice", "user123").await.unwrap();
    let bob = auth.register(None, "bob", "user123").await.unwrap();

    let messages = MessageService::new(
        db.clone(),
        wrap(local.clone()),
        LifecycleConfig {
            call_timeout: Duration::from_secs(5),
            playback_ttl: Duration::from_secs(3600),
        },
    );

    let moderator_claims = auth.verify_token(&moderator.token).unwrap();
    let alice_claims = auth.verify_token(&alice.token).unwrap();
    let bob_claims = auth.verify_token(&bob.token).unwrap();

    Fixture {
        state: Arc::new(AppStateInner { auth, messages }),
        db,
        local,
        moderator: moderator_claims,
        moderator_token: moderator.token,
        alice: alice_claims,
        alice_token: alice.token,
        bob: bob_claims,
        bob_token: bob.token,
        _dir: dir,
    }
}

pub fn recording(bytes: &'static [u8]) -> AudioUpload {
    AudioUpload {
        bytes: Bytes::from_static(bytes),
        content_type: "audio/mp4".into(),
    }
}

/// Keys currently present in the blob store, sorted.
pub async fn stored_keys(fixture: &Fixture) -> Vec<String> {
    let mut keys: Vec<String> = fixture
        .local
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.key)
        .collect();
    keys.sort();
    keys
}
