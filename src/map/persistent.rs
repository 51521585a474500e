//! Immutable, content-addressed ordered maps.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::map::builder::{BuildMode, MapBuilder};
use crate::map::error::{MapBuildError, MapBuildResult};
use crate::map::node::{ChildRef, MapKey, MapValue, Node, NodeAssembler};
use crate::storage::{get_value, Hash, SharedStore, StorageResult};

/// Serializable pointer to a map, embedded in table and root records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapRef {
    pub root: Hash,
    pub len: u64,
}

/// A read-only ordered map whose nodes live in a value store.
///
/// Cloning is cheap: only the root hash and a store handle are copied.
pub struct PersistentMap<K, V> {
    store: SharedStore,
    root: Hash,
    len: u64,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: MapKey, V: MapValue> PersistentMap<K, V> {
    pub(crate) fn new(store: SharedStore, root: Hash, len: u64) -> Self {
        Self {
            store,
            root,
            len,
            _marker: PhantomData,
        }
    }

    /// load a map previously recorded as a [`MapRef`]
    pub fn load(store: SharedStore, map_ref: MapRef) -> Self {
        Self::new(store, map_ref.root, map_ref.len)
    }

    /// the empty map, written directly without a builder
    pub fn empty(store: SharedStore) -> StorageResult<Self> {
        let (root, len) = NodeAssembler::<K, V>::new(store.clone()).finish()?;
        Ok(Self::new(store, root, len))
    }

    /// Build a map from entries already in strictly increasing key order.
    pub fn from_sorted<I>(store: SharedStore, mode: BuildMode, entries: I) -> MapBuildResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut builder = MapBuilder::new(store, mode)?;
        for (key, value) in entries {
            if let Err(e) = builder.write(key, value) {
                let _ = builder.close();
                return Err(e);
            }
        }
        builder.close()?;
        builder.into_map().ok_or(MapBuildError::Aborted)
    }

    /// root node hash; equal maps have equal hashes
    pub fn hash(&self) -> Hash {
        self.root
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn map_ref(&self) -> MapRef {
        MapRef {
            root: self.root,
            len: self.len,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn get(&self, key: &K) -> StorageResult<Option<V>> {
        let mut hash = self.root;
        loop {
            match get_value::<Node<K, V>>(&*self.store, &hash)? {
                Node::Leaf { mut entries } => {
                    return Ok(match entries.binary_search_by(|(k, _)| k.cmp(key)) {
                        Ok(idx) => Some(entries.swap_remove(idx).1),
                        Err(_) => None,
                    });
                }
                Node::Internal { children } => {
                    let idx = children.partition_point(|c| c.last_key < *key);
                    match children.get(idx) {
                        Some(child) => hash = child.hash,
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    pub fn contains_key(&self, key: &K) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// entries in key order, loading nodes lazily
    pub fn iter(&self) -> MapIter<K, V> {
        MapIter {
            store: self.store.clone(),
            pending: vec![vec![self.root].into_iter()],
            leaf: Vec::new().into_iter(),
        }
    }

    pub fn keys(&self) -> StorageResult<Vec<K>> {
        self.iter().map(|entry| entry.map(|(k, _)| k)).collect()
    }

    pub fn entries(&self) -> StorageResult<Vec<(K, V)>> {
        self.iter().collect()
    }
}

impl<K, V> Clone for PersistentMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            root: self.root,
            len: self.len,
            _marker: PhantomData,
        }
    }
}

impl<K, V> PartialEq for PersistentMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl<K, V> fmt::Debug for PersistentMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentMap")
            .field("root", &self.root)
            .field("len", &self.len)
            .finish()
    }
}

/// Depth-first iterator over a map's entries.
pub struct MapIter<K, V> {
    store: SharedStore,
    /// unvisited node hashes, one iterator per tree level
    pending: Vec<std::vec::IntoIter<Hash>>,
    leaf: std::vec::IntoIter<(K, V)>,
}

impl<K: MapKey, V: MapValue> Iterator for MapIter<K, V> {
    type Item = StorageResult<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.leaf.next() {
                return Some(Ok(entry));
            }

            let level = self.pending.last_mut()?;
            let Some(hash) = level.next() else {
                self.pending.pop();
                continue;
            };

            match get_value::<Node<K, V>>(&*self.store, &hash) {
                Ok(Node::Leaf { entries }) => self.leaf = entries.into_iter(),
                Ok(Node::Internal { children }) => {
                    let hashes: Vec<Hash> = children.into_iter().map(|c: ChildRef<K>| c.hash).collect();
                    self.pending.push(hashes.into_iter());
                }
                Err(e) => {
                    self.pending.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}
