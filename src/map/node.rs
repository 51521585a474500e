//! Tree nodes and the incremental node assembler.
//!
//! Leaves hold sorted entries, internal nodes hold references to children
//! keyed by the child's last key. Node boundaries are a pure function of the
//! entry sequence (every `fanout` items), so two maps with the same entries
//! always serialize to the same nodes and therefore the same root hash.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::storage::{put_value, SharedStore, StorageResult, Hash};

/// default number of entries per leaf and children per internal node
pub const NODE_FANOUT: usize = 64;

/// bounds a map key must satisfy
pub trait MapKey: Ord + Clone + Debug + Serialize + DeserializeOwned + Send + 'static {}

impl<T> MapKey for T where T: Ord + Clone + Debug + Serialize + DeserializeOwned + Send + 'static {}

/// bounds a map value must satisfy
pub trait MapValue: Serialize + DeserializeOwned + Send + 'static {}

impl<T> MapValue for T where T: Serialize + DeserializeOwned + Send + 'static {}

/// reference from an internal node to a child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ChildRef<K> {
    pub last_key: K,
    pub hash: Hash,
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Node<K, V> {
    Leaf { entries: Vec<(K, V)> },
    Internal { children: Vec<ChildRef<K>> },
}

/// Builds the tree bottom-up from a sorted stream, one entry at a time.
///
/// Only the rightmost open node of each level is held in memory; every full
/// node is written to the store as soon as it closes.
pub(crate) struct NodeAssembler<K, V> {
    store: SharedStore,
    fanout: usize,
    leaf: Vec<(K, V)>,
    levels: Vec<Vec<ChildRef<K>>>,
    count: u64,
}

impl<K: MapKey, V: MapValue> NodeAssembler<K, V> {
    pub fn new(store: SharedStore) -> Self {
        Self::with_fanout(store, NODE_FANOUT)
    }

    pub fn with_fanout(store: SharedStore, fanout: usize) -> Self {
        Self {
            store,
            fanout: fanout.max(2),
            leaf: Vec::new(),
            levels: Vec::new(),
            count: 0,
        }
    }

    /// append the next entry; ordering is checked by the caller
    pub fn push(&mut self, key: K, value: V) -> StorageResult<()> {
        self.leaf.push((key, value));
        self.count += 1;
        if self.leaf.len() >= self.fanout {
            self.flush_leaf()?;
        }
        Ok(())
    }

    /// close every open node and return the root hash and entry count
    pub fn finish(mut self) -> StorageResult<(Hash, u64)> {
        if self.count == 0 {
            let empty: Node<K, V> = Node::Leaf { entries: Vec::new() };
            return Ok((put_value(&*self.store, &empty)?, 0));
        }

        if !self.leaf.is_empty() {
            self.flush_leaf()?;
        }

        let mut level = 0;
        loop {
            let top = level + 1 == self.levels.len();
            if top && self.levels[level].len() == 1 {
                let root = &self.levels[level][0];
                return Ok((root.hash, self.count));
            }
            if !self.levels[level].is_empty() {
                self.flush_level(level)?;
            }
            level += 1;
        }
    }

    fn flush_leaf(&mut self) -> StorageResult<()> {
        let entries = std::mem::take(&mut self.leaf);
        let Some(last_key) = entries.last().map(|(k, _)| k.clone()) else {
            return Ok(());
        };
        let count = entries.len() as u64;
        let hash = put_value(&*self.store, &Node::<K, V>::Leaf { entries })?;
        self.push_child(0, ChildRef { last_key, hash, count })
    }

    fn flush_level(&mut self, level: usize) -> StorageResult<()> {
        let children = std::mem::take(&mut self.levels[level]);
        let Some(last_key) = children.last().map(|c| c.last_key.clone()) else {
            return Ok(());
        };
        let count = children.iter().map(|c| c.count).sum();
        let hash = put_value(&*self.store, &Node::<K, V>::Internal { children })?;
        self.push_child(level + 1, ChildRef { last_key, hash, count })
    }

    fn push_child(&mut self, level: usize, child: ChildRef<K>) -> StorageResult<()> {
        if self.levels.len() <= level {
            self.levels.push(Vec::new());
        }
        self.levels[level].push(child);
        if self.levels[level].len() >= self.fanout {
            self.flush_level(level)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{get_value, MemoryStore};

    fn assemble(store: &SharedStore, fanout: usize, n: u32) -> (Hash, u64) {
        let mut assembler = NodeAssembler::<u32, String>::with_fanout(store.clone(), fanout);
        for i in 0..n {
            assembler.push(i, format!("v{}", i)).unwrap();
        }
        assembler.finish().unwrap()
    }

    #[test]
    fn test_empty_map_is_empty_leaf() {
        let store = MemoryStore::shared();
        let (hash, count) = assemble(&store, 4, 0);
        assert_eq!(count, 0);

        let node: Node<u32, String> = get_value(&*store, &hash).unwrap();
        assert!(matches!(node, Node::Leaf { entries } if entries.is_empty()));
    }

    #[test]
    fn test_small_map_is_single_leaf() {
        let store = MemoryStore::shared();
        let (hash, count) = assemble(&store, 4, 3);
        assert_eq!(count, 3);

        let node: Node<u32, String> = get_value(&*store, &hash).unwrap();
        assert!(matches!(node, Node::Leaf { entries } if entries.len() == 3));
    }

    #[test]
    fn test_multi_level_counts() {
        let store = MemoryStore::shared();
        // 4 * 4 * 2 + 1 entries forces two levels of internal nodes
        let (hash, count) = assemble(&store, 4, 33);
        assert_eq!(count, 33);

        let node: Node<u32, String> = get_value(&*store, &hash).unwrap();
        match node {
            Node::Internal { children } => {
                assert_eq!(children.iter().map(|c| c.count).sum::<u64>(), 33);
                assert_eq!(children.last().unwrap().last_key, 32);
            }
            Node::Leaf { .. } => panic!("expected an internal root"),
        }
    }

    #[test]
    fn test_exact_multiple_of_fanout() {
        let store = MemoryStore::shared();
        let (hash, count) = assemble(&store, 4, 16);
        assert_eq!(count, 16);

        let node: Node<u32, String> = get_value(&*store, &hash).unwrap();
        assert!(matches!(node, Node::Internal { children } if children.len() == 4));
    }

    #[test]
    fn test_same_entries_same_hash() {
        let a = assemble(&MemoryStore::shared(), 4, 50);
        let b = assemble(&MemoryStore::shared(), 4, 50);
        assert_eq!(a, b);

        let c = assemble(&MemoryStore::shared(), 4, 51);
        assert_ne!(a.0, c.0);
    }
}
