//! Root values: immutable snapshots of every table and doc in a database.
//!
//! A root value is two persistent maps, table name to table hash and doc name
//! to doc hash. All operations return a new root; the hash of a root is the
//! hash of its record, so equal mappings always share a hash.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::map::{BuildMode, MapKey, MapRef, PersistentMap};
use crate::root::docs::DocName;
use crate::root::error::RootResult;
use crate::root::table::Table;
use crate::storage::{get_value, hash_value, put_value, Hash, SharedStore, TableName};

#[derive(Debug, Serialize, Deserialize)]
struct RootRecord {
    tables: MapRef,
    docs: MapRef,
}

#[derive(Clone)]
pub struct RootValue {
    store: SharedStore,
    tables: PersistentMap<TableName, Hash>,
    docs: PersistentMap<DocName, Hash>,
    hash: Hash,
}

impl RootValue {
    fn from_maps(
        store: SharedStore,
        tables: PersistentMap<TableName, Hash>,
        docs: PersistentMap<DocName, Hash>,
    ) -> RootResult<Self> {
        let hash = hash_value(&RootRecord {
            tables: tables.map_ref(),
            docs: docs.map_ref(),
        })?;
        Ok(Self {
            store,
            tables,
            docs,
            hash,
        })
    }

    /// a root with no tables and no docs
    pub fn empty(store: SharedStore) -> RootResult<Self> {
        let tables = PersistentMap::empty(store.clone())?;
        let docs = PersistentMap::empty(store.clone())?;
        Self::from_maps(store, tables, docs)
    }

    pub fn load(store: SharedStore, hash: &Hash) -> RootResult<Self> {
        let record: RootRecord = get_value(&*store, hash)?;
        let tables = PersistentMap::load(store.clone(), record.tables);
        let docs = PersistentMap::load(store.clone(), record.docs);
        Self::from_maps(store, tables, docs)
    }

    /// store the root record; the returned hash equals [`hash_of`](Self::hash_of)
    pub fn write(&self) -> RootResult<Hash> {
        Ok(put_value(
            &*self.store,
            &RootRecord {
                tables: self.tables.map_ref(),
                docs: self.docs.map_ref(),
            },
        )?)
    }

    pub fn hash_of(&self) -> Hash {
        self.hash
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    // ==================== Tables ====================

    pub fn has_table(&self, name: &TableName) -> RootResult<bool> {
        Ok(self.tables.contains_key(name)?)
    }

    pub fn get_table_hash(&self, name: &TableName) -> RootResult<Option<Hash>> {
        Ok(self.tables.get(name)?)
    }

    pub fn get_table(&self, name: &TableName) -> RootResult<Option<Table>> {
        match self.tables.get(name)? {
            Some(hash) => Ok(Some(Table::load(self.store.clone(), &hash)?)),
            None => Ok(None),
        }
    }

    /// table names in sorted order
    pub fn table_names(&self) -> RootResult<Vec<TableName>> {
        Ok(self.tables.keys()?)
    }

    /// Store `table` and set it under `name`, replacing any existing table.
    pub fn put_table(&self, name: &TableName, table: &Table) -> RootResult<RootValue> {
        let hash = table.write()?;
        let mut edits = BTreeMap::new();
        edits.insert(name.clone(), Some(hash));
        self.put_table_hashes(edits)
    }

    /// Apply hash-level edits: `Some` sets a table hash, `None` removes the
    /// table. Hashes are used verbatim and must already be stored.
    pub fn put_table_hashes(&self, edits: BTreeMap<TableName, Option<Hash>>) -> RootResult<RootValue> {
        let tables = apply_edits(&self.tables, edits)?;
        Self::from_maps(self.store.clone(), tables, self.docs.clone())
    }

    pub fn remove_tables(&self, names: &[TableName]) -> RootResult<RootValue> {
        let edits = names.iter().map(|n| (n.clone(), None)).collect();
        self.put_table_hashes(edits)
    }

    // ==================== Docs ====================

    pub fn has_doc(&self, name: DocName) -> RootResult<bool> {
        Ok(self.docs.contains_key(&name)?)
    }

    pub fn get_doc_hash(&self, name: DocName) -> RootResult<Option<Hash>> {
        Ok(self.docs.get(&name)?)
    }

    /// doc text, if the doc is present
    pub fn get_doc(&self, name: DocName) -> RootResult<Option<String>> {
        match self.docs.get(&name)? {
            Some(hash) => Ok(Some(get_value(&*self.store, &hash)?)),
            None => Ok(None),
        }
    }

    pub fn doc_names(&self) -> RootResult<Vec<DocName>> {
        Ok(self.docs.keys()?)
    }

    /// Store doc texts; `None` removes the doc.
    pub fn put_docs(&self, docs: &[(DocName, Option<String>)]) -> RootResult<RootValue> {
        let mut edits = BTreeMap::new();
        for (name, text) in docs {
            let hash = match text {
                Some(text) => Some(put_value(&*self.store, text)?),
                None => None,
            };
            edits.insert(*name, hash);
        }
        self.put_doc_hashes(edits)
    }

    pub fn put_doc_hashes(&self, edits: BTreeMap<DocName, Option<Hash>>) -> RootResult<RootValue> {
        let docs = apply_edits(&self.docs, edits)?;
        Self::from_maps(self.store.clone(), self.tables.clone(), docs)
    }
}

impl PartialEq for RootValue {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl fmt::Debug for RootValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootValue")
            .field("hash", &self.hash)
            .field("tables", &self.tables.len())
            .field("docs", &self.docs.len())
            .finish()
    }
}

/// Rebuild a name→hash map with edits applied.
///
/// Root-level maps hold one entry per table, so they are merged in memory
/// and assembled inline.
fn apply_edits<K: MapKey>(
    map: &PersistentMap<K, Hash>,
    edits: BTreeMap<K, Option<Hash>>,
) -> RootResult<PersistentMap<K, Hash>> {
    if edits.is_empty() {
        return Ok(map.clone());
    }

    let mut merged: BTreeMap<K, Hash> = map.entries()?.into_iter().collect();
    for (key, hash) in edits {
        match hash {
            Some(hash) => {
                merged.insert(key, hash);
            }
            None => {
                merged.remove(&key);
            }
        }
    }

    Ok(PersistentMap::from_sorted(map.store().clone(), BuildMode::Inline, merged)?)
}

/// every table name present in either root, sorted and deduplicated
pub fn union_table_names(a: &RootValue, b: &RootValue) -> RootResult<Vec<TableName>> {
    let mut names: BTreeSet<TableName> = a.table_names()?.into_iter().collect();
    names.extend(b.table_names()?);
    Ok(names.into_iter().collect())
}

/// every doc name present in either root
pub fn union_doc_names(a: &RootValue, b: &RootValue) -> RootResult<Vec<DocName>> {
    let mut names: BTreeSet<DocName> = a.doc_names()?.into_iter().collect();
    names.extend(b.doc_names()?);
    Ok(names.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root::row::TableSchema;
    use crate::storage::MemoryStore;

    fn name(s: &str) -> TableName {
        TableName::new(s).unwrap()
    }

    fn table(store: &SharedStore, columns: &[&str]) -> Table {
        let schema = TableSchema::new(columns.iter().copied()).unwrap();
        Table::empty(store.clone(), &schema).unwrap()
    }

    #[test]
    fn test_empty_root() {
        let store = MemoryStore::shared();
        let root = RootValue::empty(store.clone()).unwrap();

        assert!(root.table_names().unwrap().is_empty());
        assert!(root.doc_names().unwrap().is_empty());
        assert_eq!(root, RootValue::empty(store).unwrap());
    }

    #[test]
    fn test_put_and_get_table() {
        let store = MemoryStore::shared();
        let users = table(&store, &["id", "name"]);
        let root = RootValue::empty(store.clone())
            .unwrap()
            .put_table(&name("users"), &users)
            .unwrap();

        assert!(root.has_table(&name("users")).unwrap());
        assert!(!root.has_table(&name("orders")).unwrap());
        assert_eq!(
            root.get_table_hash(&name("users")).unwrap(),
            Some(users.hash().unwrap())
        );
        let loaded = root.get_table(&name("users")).unwrap().unwrap();
        assert_eq!(loaded.schema().unwrap().columns, vec!["id", "name"]);
    }

    #[test]
    fn test_put_table_overwrites() {
        let store = MemoryStore::shared();
        let v1 = table(&store, &["id"]);
        let v2 = table(&store, &["id", "extra"]);

        let root = RootValue::empty(store)
            .unwrap()
            .put_table(&name("t"), &v1)
            .unwrap()
            .put_table(&name("t"), &v2)
            .unwrap();

        assert_eq!(root.table_names().unwrap(), vec![name("t")]);
        assert_eq!(root.get_table_hash(&name("t")).unwrap(), Some(v2.hash().unwrap()));
    }

    #[test]
    fn test_equal_mappings_equal_hashes() {
        let store = MemoryStore::shared();
        let a = table(&store, &["id"]);
        let b = table(&store, &["id", "x"]);
        let empty = RootValue::empty(store.clone()).unwrap();

        let ab = empty.put_table(&name("a"), &a).unwrap().put_table(&name("b"), &b).unwrap();
        let ba = empty.put_table(&name("b"), &b).unwrap().put_table(&name("a"), &a).unwrap();
        assert_eq!(ab.hash_of(), ba.hash_of());

        let removed = ab.remove_tables(&[name("a"), name("b")]).unwrap();
        assert_eq!(removed.hash_of(), empty.hash_of());
    }

    #[test]
    fn test_write_and_load() {
        let store = MemoryStore::shared();
        let root = RootValue::empty(store.clone())
            .unwrap()
            .put_table(&name("t"), &table(&store, &["id"]))
            .unwrap();

        let hash = root.write().unwrap();
        assert_eq!(hash, root.hash_of());

        let loaded = RootValue::load(store, &hash).unwrap();
        assert_eq!(loaded, root);
        assert_eq!(loaded.table_names().unwrap(), vec![name("t")]);
    }

    #[test]
    fn test_docs() {
        let store = MemoryStore::shared();
        let root = RootValue::empty(store)
            .unwrap()
            .put_docs(&[(DocName::Readme, Some("# hello".to_string()))])
            .unwrap();

        assert!(root.has_doc(DocName::Readme).unwrap());
        assert_eq!(root.get_doc(DocName::Readme).unwrap().as_deref(), Some("# hello"));
        assert!(root.get_doc(DocName::License).unwrap().is_none());

        let removed = root.put_docs(&[(DocName::Readme, None)]).unwrap();
        assert!(removed.doc_names().unwrap().is_empty());
    }

    #[test]
    fn test_unions() {
        let store = MemoryStore::shared();
        let t = table(&store, &["id"]);
        let empty = RootValue::empty(store).unwrap();
        let left = empty.put_table(&name("a"), &t).unwrap().put_table(&name("b"), &t).unwrap();
        let right = empty
            .put_table(&name("b"), &t)
            .unwrap()
            .put_table(&name("c"), &t)
            .unwrap()
            .put_docs(&[(DocName::License, Some("MIT".to_string()))])
            .unwrap();

        assert_eq!(
            union_table_names(&left, &right).unwrap(),
            vec![name("a"), name("b"), name("c")]
        );
        assert_eq!(union_doc_names(&left, &right).unwrap(), vec![DocName::License]);
    }
}
