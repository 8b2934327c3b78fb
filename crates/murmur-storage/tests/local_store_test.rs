//! Integration tests for the on-disk blob store.

use std::time::Duration;

use bytes::Bytes;
use murmur_storage::{BlobStore, DeleteOutcome, LocalBlobStore, UrlSigner};
use tempfile::tempdir;
use tokio::io::AsyncReadExt;

async fn store(dir: &std::path::Path) -> LocalBlobStore {
    LocalBlobStore::new(dir.to_path_buf(), "http://localhost:3000/", UrlSigner::new("test-secret"))
        .await
        .unwrap()
}

/// Pull `(key, expires, signature)` back out of a signed URL.
fn parse_signed_url(url: &str) -> (String, i64, String) {
    let rest = url.strip_prefix("http://localhost:3000/blobs/").unwrap();
    let (key, query) = rest.split_once('?').unwrap();
    let mut expires = None;
    let mut signature = None;
    for pair in query.split('&') {
        match pair.split_once('=').unwrap() {
            ("expires", v) => expires = Some(v.parse().unwrap()),
            ("signature", v) => signature = Some(v.to_string()),
            _ => {}
        }
    }
    (key.to_string(), expires.unwrap(), signature.unwrap())
}

#[tokio::test]
async fn put_sign_fetch_round_trip() {
    let dir = tempdir().unwrap();
    let store = store(dir.path()).await;
    let payload = Bytes::from_static(b"RIFF fake wav payload");

    let key = store.put(payload.clone(), "audio/wav").await.unwrap();
    assert!(key.starts_with("audio/") && key.ends_with(".wav"));

    let url = store.signed_get_url(&key, Duration::from_secs(3600)).await.unwrap();
    let (url_key, expires, signature) = parse_signed_url(&url);
    assert_eq!(url_key, key);

    let (mut file, len) = store.open_signed(&key, expires, &signature).await.unwrap().unwrap();
    let mut fetched = Vec::new();
    file.read_to_end(&mut fetched).await.unwrap();
    assert_eq!(len as usize, payload.len());
    assert_eq!(fetched, payload.to_vec());
}

#[tokio::test]
async fn two_urls_for_one_key_reach_the_same_bytes() {
    let dir = tempdir().unwrap();
    let store = store(dir.path()).await;
    let key = store.put(Bytes::from_static(b"voice"), "audio/mp4").await.unwrap();

    for _ in 0..2 {
        let url = store.signed_get_url(&key, Duration::from_secs(60)).await.unwrap();
        let (_, expires, signature) = parse_signed_url(&url);
        let (mut file, _) = store.open_signed(&key, expires, &signature).await.unwrap().unwrap();
        let mut fetched = Vec::new();
        file.read_to_end(&mut fetched).await.unwrap();
        assert_eq!(fetched, b"voice");
    }
}

#[tokio::test]
async fn tampered_or_expired_signatures_are_refused() {
    let dir = tempdir().unwrap();
    let store = store(dir.path()).await;
    let key = store.put(Bytes::from_static(b"voice"), "audio/mp4").await.unwrap();
    let other = store.put(Bytes::from_static(b"other"), "audio/mp4").await.unwrap();

    let url = store.signed_get_url(&key, Duration::from_secs(60)).await.unwrap();
    let (_, expires, signature) = parse_signed_url(&url);

    assert!(store.open_signed(&other, expires, &signature).await.unwrap().is_none());
    assert!(store.open_signed(&key, expires + 1, &signature).await.unwrap().is_none());

    let past = chrono::Utc::now().timestamp() - 10;
    let stale = UrlSigner::new("test-secret").sign(&key, past);
    assert!(store.open_signed(&key, past, &stale).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = store(dir.path()).await;
    let key = store.put(Bytes::from_static(b"voice"), "audio/mp4").await.unwrap();

    assert_eq!(store.delete(&key).await, DeleteOutcome::Deleted);
    assert_eq!(store.delete(&key).await, DeleteOutcome::AlreadyAbsent);
}

#[tokio::test]
async fn keys_outside_the_store_layout_are_rejected() {
    let dir = tempdir().unwrap();
    let store = store(dir.path()).await;

    for key in ["../etc/passwd", "audio/../../secret", "audio/", "audio/.hidden", "other/x.m4a"] {
        assert!(store.signed_get_url(key, Duration::from_secs(60)).await.is_err(), "{key}");
        assert!(matches!(store.delete(key).await, DeleteOutcome::Failed(_)), "{key}");
    }
}

#[tokio::test]
async fn list_reports_stored_blobs() {
    let dir = tempdir().unwrap();
    let store = store(dir.path()).await;
    let a = store.put(Bytes::from_static(b"a"), "audio/mp4").await.unwrap();
    let b = store.put(Bytes::from_static(b"b"), "audio/ogg").await.unwrap();

    let mut keys: Vec<String> = store.list().await.unwrap().into_iter().map(|b| b.key).collect();
    keys.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(keys, expected);
}
