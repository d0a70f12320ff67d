//! # SledStore: On-Disk Secret Store
//!
//! The node's persistence provider, built on sled's embedded key-value
//! store. Identity records and device secrets live in a single `meld`
//! tree, keyed by their UTF-8 storage key.
//!
//! Every `set` and `remove` is flushed before returning, so a successful
//! call means the bytes are on disk. That is what lets the registry treat
//! a completed write as committed.

use async_trait::async_trait;
use sled::{Db, Tree};
use std::path::Path;

use super::kv::KeyValueStore;
use super::StoreError;

const TREE_NAME: &str = "meld";

/// sled-backed [`KeyValueStore`].
///
/// sled is thread-safe; `SledStore` can be shared via `Arc` without
/// external locking.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    tree: Tree,
}

impl SledStore {
    /// Open or create a store at the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A store that is deleted when dropped. For tests.
    pub fn open_temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        let tree = db.open_tree(TREE_NAME)?;
        Ok(Self { db, tree })
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Size of the database on disk, in bytes.
    pub fn size_on_disk(&self) -> Result<u64, StoreError> {
        Ok(self.db.size_on_disk()?)
    }
}

#[async_trait]
impl KeyValueStore for SledStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.tree.get(key.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|_| StoreError::Corrupt(format!("value at '{}' is not UTF-8", key))),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.tree.insert(key.as_bytes(), value.as_bytes())?;
        self.tree.flush()?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.tree.remove(key.as_bytes())?;
        self.tree.flush()?;
        Ok(())
    }
}
