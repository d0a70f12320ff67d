//! # Storage
//!
//! The collaborator interfaces the core persists through:
//!
//! ```text
//! kv.rs       KeyValueStore trait + MemoryStore (identity record, device secrets)
//! db.rs       SledStore, the on-disk KeyValueStore used by the node
//! archive.rs  MomentArchive trait + MemoryArchive (remote moment API)
//! ```
//!
//! Storage failures are the one place the core retries: a call that fails
//! with `StorageUnavailable` or `Timeout` gets exactly one more attempt
//! after a short backoff ([`retry_once`]), then the error is surfaced.

pub mod archive;
pub mod db;
pub mod kv;

pub use archive::{MemoryArchive, MomentArchive};
pub use db::SledStore;
pub use kv::{KeyValueStore, MemoryStore};

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::error::{Classify, ErrorKind};

/// Errors from persistence providers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),

    #[error("record rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Unavailable(_) | StoreError::Sled(_) => ErrorKind::StorageUnavailable,
            StoreError::Corrupt(_) | StoreError::Rejected(_) => ErrorKind::Validation,
        }
    }
}

/// Run `op`; if it fails with a retryable kind, wait `backoff` and run it
/// once more. The second result is returned as is.
pub async fn retry_once<T, E, F, Fut>(mut op: F, backoff: Duration) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + Display,
{
    match op().await {
        Err(err) if err.error_kind().is_retryable() => {
            warn!(error = %err, backoff_ms = backoff.as_millis() as u64, "retrying once");
            tokio::time::sleep(backoff).await;
            op().await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_storage_failures_once() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<u8, StoreError> = retry_once(
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(StoreError::Unavailable("flaky".into()))
                } else {
                    Ok(7)
                }
            },
            Duration::from_millis(250),
        )
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_second_failure() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), StoreError> = retry_once(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Unavailable("down".into()))
            },
            Duration::from_millis(250),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn validation_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), StoreError> = retry_once(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Corrupt("bad json".into()))
            },
            Duration::from_millis(250),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
