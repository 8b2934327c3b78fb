//! Bounded calls into the repository and blob store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use murmur_db::Database;
use tokio::time::timeout;

use crate::error::ServiceError;

/// Why a bounded call did not produce a value.
///
/// A timed-out write may still land afterwards, so callers must not treat
/// `TimedOut` as "definitely did not happen".
#[derive(Debug)]
pub enum CallFailure {
    TimedOut,
    Failed(anyhow::Error),
}

impl CallFailure {
    pub fn into_service_error(self, context: &str) -> ServiceError {
        match self {
            Self::TimedOut => ServiceError::storage(context, "timed out"),
            Self::Failed(e) => ServiceError::storage(context, e),
        }
    }
}

/// Run a blocking repository call off the async runtime, bounded by `limit`.
pub async fn db_call<F, T>(db: &Arc<Database>, limit: Duration, f: F) -> Result<T, CallFailure>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    match timeout(limit, tokio::task::spawn_blocking(move || f(&db))).await {
        Err(_) => Err(CallFailure::TimedOut),
        Ok(Err(join)) => Err(CallFailure::Failed(anyhow::anyhow!("spawn_blocking join error: {}", join))),
        Ok(Ok(result)) => result.map_err(CallFailure::Failed),
    }
}

/// Bound an async blob store call by `limit`.
pub async fn blob_call<Fut, T>(limit: Duration, fut: Fut) -> Result<T, CallFailure>
where
    Fut: Future<Output = anyhow::Result<T>>,
{
    match timeout(limit, fut).await {
        Err(_) => Err(CallFailure::TimedOut),
        Ok(result) => result.map_err(CallFailure::Failed),
    }
}
