//! Local key/value persistence.
//!
//! The identity core only ever needs `get`, `set` and `remove` by string
//! key with string values. Anything that can do that (a browser store, a
//! keychain, an embedded database) can host an identity.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use super::StoreError;

/// A string key/value persistence provider.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store backed by a `DashMap`.
///
/// Also supports fault injection so callers can exercise their
/// storage-failure paths: the whole store can be taken offline, or writes
/// to specific keys can be made to fail.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
    offline: AtomicBool,
    failing_keys: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `Unavailable` until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make writes to `key` fail with `Unavailable`.
    pub fn fail_writes_to(&self, key: impl Into<String>) {
        self.failing_keys.lock().insert(key.into());
    }

    /// Stop injecting write failures.
    pub fn clear_faults(&self) {
        self.failing_keys.lock().clear();
        self.set_offline(false);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_online()?;
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_online()?;
        if self.failing_keys.lock().contains(key) {
            return Err(StoreError::Unavailable(format!("write to '{}' failed", key)));
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check_online()?;
        self.entries.remove(key);
        Ok(())
    }
}
