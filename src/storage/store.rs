//! Content-addressed value storage.
//!
//! A store maps a [`Hash`] to the bytes it was computed from. Stores are
//! append-only: a value is never rewritten or removed, so concurrent readers
//! and writers need no coordination beyond the store's own locking.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::Hash;

/// Backing storage for every immutable value (map nodes, tables, roots).
pub trait ValueStore: Send + Sync {
    /// read the bytes stored under `hash`, if any
    fn get(&self, hash: &Hash) -> StorageResult<Option<Vec<u8>>>;

    /// store `bytes` and return their address
    fn put(&self, bytes: &[u8]) -> StorageResult<Hash>;

    fn contains(&self, hash: &Hash) -> StorageResult<bool> {
        Ok(self.get(hash)?.is_some())
    }
}

/// shared handle to a store, cloned into map builders and roots
pub type SharedStore = Arc<dyn ValueStore>;

/// serialize `value` and store it
pub fn put_value<T: Serialize + ?Sized>(store: &dyn ValueStore, value: &T) -> StorageResult<Hash> {
    let bytes = serde_json::to_vec(value)?;
    store.put(&bytes)
}

/// load and deserialize the value at `hash`
pub fn get_value<T: DeserializeOwned>(store: &dyn ValueStore, hash: &Hash) -> StorageResult<T> {
    let bytes = store
        .get(hash)?
        .ok_or(StorageError::ValueNotFound(*hash))?;

    serde_json::from_slice(&bytes).map_err(|e| StorageError::CorruptedData {
        hash: *hash,
        reason: e.to_string(),
    })
}

/// address `value` would be stored under, without storing it
pub fn hash_value<T: Serialize + ?Sized>(value: &T) -> StorageResult<Hash> {
    let bytes = serde_json::to_vec(value)?;
    Ok(Hash::of(&bytes))
}

/// In-memory store, used by tests and by throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<Hash, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// convenience constructor returning a shared handle
    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl ValueStore for MemoryStore {
    fn get(&self, hash: &Hash) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.values.read().get(hash).cloned())
    }

    fn put(&self, bytes: &[u8]) -> StorageResult<Hash> {
        let hash = Hash::of(bytes);
        self.values
            .write()
            .entry(hash)
            .or_insert_with(|| bytes.to_vec());
        Ok(hash)
    }

    fn contains(&self, hash: &Hash) -> StorageResult<bool> {
        Ok(self.values.read().contains_key(hash))
    }
}
