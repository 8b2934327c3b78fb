use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::signing::UrlSigner;
use crate::{BlobStore, DeleteOutcome, StoredBlob, extension_for};

/// Every key this store hands out lives under this prefix.
const KEY_PREFIX: &str = "audio/";

/// On-disk blob store.
///
/// Each blob is a flat file at `{dir}/audio/{uuid}.{ext}`; the key is the
/// path relative to `dir`. Retrieval URLs point back at this server's
/// `/blobs/{key}` route and carry an HMAC over the key and expiry.
pub struct LocalBlobStore {
    dir: PathBuf,
    public_url: String,
    signer: UrlSigner,
}

impl LocalBlobStore {
    pub async fn new(dir: PathBuf, public_url: &str, signer: UrlSigner) -> Result<Self> {
        fs::create_dir_all(dir.join(KEY_PREFIX)).await?;
        info!("Blob storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_url: public_url.trim_end_matches('/').to_string(),
            signer,
        })
    }

    /// Map a key to its file, rejecting anything this store could not have
    /// produced (including path traversal attempts).
    fn blob_path(&self, key: &str) -> Result<PathBuf> {
        let Some(name) = key.strip_prefix(KEY_PREFIX) else {
            bail!("Malformed blob key '{}'", key);
        };
        let well_formed = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains("..")
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
        if !well_formed {
            bail!("Malformed blob key '{}'", key);
        }
        Ok(self.dir.join(KEY_PREFIX).join(name))
    }

    /// Open a blob for serving if `signature` authorizes `key` until `expires`.
    /// Returns `Ok(None)` when the signature is bad or the blob is gone.
    pub async fn open_signed(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
    ) -> Result<Option<(fs::File, u64)>> {
        if !self.signer.verify(key, expires, signature, Utc::now().timestamp()) {
            debug!("Rejected signature for blob {}", key);
            return Ok(None);
        }
        let Ok(path) = self.blob_path(key) else {
            return Ok(None);
        };
        match fs::File::open(&path).await {
            Ok(file) => {
                let len = file.metadata().await?.len();
                Ok(Some((file, len)))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, bytes: Bytes, content_type: &str) -> Result<String> {
        let key = format!("{}{}.{}", KEY_PREFIX, Uuid::new_v4(), extension_for(content_type));
        let path = self.blob_path(&key)?;
        let tmp = path.with_extension("tmp");

        // Write under a temp name and rename so a half-written blob is never
        // visible under a real key.
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &path).await?;

        debug!("Stored blob {} ({} bytes)", key, bytes.len());
        Ok(key)
    }

    async fn signed_get_url(&self, key: &str, ttl: Duration) -> Result<String> {
        self.blob_path(key)?;
        let ttl = chrono::Duration::from_std(ttl)?;
        let expires = (Utc::now() + ttl).timestamp();
        let signature = self.signer.sign(key, expires);
        Ok(format!(
            "{}/blobs/{}?expires={}&signature={}",
            self.public_url, key, expires, signature
        ))
    }

    async fn delete(&self, key: &str) -> DeleteOutcome {
        let path = match self.blob_path(key) {
            Ok(path) => path,
            Err(e) => return DeleteOutcome::Failed(e.to_string()),
        };
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted blob {}", key);
                DeleteOutcome::Deleted
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Blob {} already gone", key);
                DeleteOutcome::AlreadyAbsent
            }
            Err(e) => DeleteOutcome::Failed(e.to_string()),
        }
    }

    async fn list(&self) -> Result<Vec<StoredBlob>> {
        let mut entries = fs::read_dir(self.dir.join(KEY_PREFIX)).await?;
        let mut blobs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            // In-flight writes
            if name.ends_with(".tmp") {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            blobs.push(StoredBlob {
                key: format!("{}{}", KEY_PREFIX, name),
                modified,
            });
        }
        Ok(blobs)
    }
}
