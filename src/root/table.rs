//! Immutable tables.
//!
//! A table is a record of four references: the schema, the row map, and the
//! optional conflict and constraint-violation maps. Every edit produces a new
//! table value; the stored record is what a root value points at.

use serde::{Deserialize, Serialize};

use crate::map::{BuildMode, MapRef, PersistentMap};
use crate::root::error::{RootError, RootResult};
use crate::root::row::{Row, RowData, TableSchema};
use crate::storage::{get_value, hash_value, put_value, Hash, RowKey, SharedStore};

/// a row that could not be merged automatically
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub base: Option<RowData>,
    pub ours: Option<RowData>,
    pub theirs: Option<RowData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    ForeignKey,
    UniqueKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintViolation {
    pub kind: ViolationKind,
    pub row: RowData,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableRecord {
    schema: Hash,
    rows: MapRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conflicts: Option<MapRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    violations: Option<MapRef>,
}

#[derive(Clone)]
pub struct Table {
    store: SharedStore,
    schema: Hash,
    rows: PersistentMap<RowKey, RowData>,
    conflicts: Option<PersistentMap<RowKey, Conflict>>,
    violations: Option<PersistentMap<RowKey, ConstraintViolation>>,
}

impl Table {
    /// Create a table over an existing row map, storing the schema.
    pub fn new(store: SharedStore, schema: &TableSchema, rows: PersistentMap<RowKey, RowData>) -> RootResult<Self> {
        if !schema.has_column(&schema.primary_key) {
            return Err(RootError::InvalidSchema {
                column: schema.primary_key.clone(),
            });
        }
        let schema = put_value(&*store, schema)?;
        Ok(Self {
            store,
            schema,
            rows,
            conflicts: None,
            violations: None,
        })
    }

    pub fn empty(store: SharedStore, schema: &TableSchema) -> RootResult<Self> {
        let rows = PersistentMap::empty(store.clone())?;
        Self::new(store, schema, rows)
    }

    /// Create a table from rows in any order.
    pub fn from_rows(store: SharedStore, schema: &TableSchema, rows: Vec<Row>, mode: BuildMode) -> RootResult<Self> {
        let mut entries: Vec<(RowKey, RowData)> = rows.into_iter().map(|r| (r.key, r.data)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let rows = PersistentMap::from_sorted(store.clone(), mode, entries)?;
        Self::new(store, schema, rows)
    }

    pub fn load(store: SharedStore, hash: &Hash) -> RootResult<Self> {
        let record: TableRecord = get_value(&*store, hash)?;
        Ok(Self {
            rows: PersistentMap::load(store.clone(), record.rows),
            conflicts: record.conflicts.map(|r| PersistentMap::load(store.clone(), r)),
            violations: record.violations.map(|r| PersistentMap::load(store.clone(), r)),
            schema: record.schema,
            store,
        })
    }

    fn record(&self) -> TableRecord {
        TableRecord {
            schema: self.schema,
            rows: self.rows.map_ref(),
            conflicts: self.conflicts.as_ref().map(PersistentMap::map_ref),
            violations: self.violations.as_ref().map(PersistentMap::map_ref),
        }
    }

    /// store the table record and return its hash
    pub fn write(&self) -> RootResult<Hash> {
        Ok(put_value(&*self.store, &self.record())?)
    }

    /// hash of the table record, without storing it
    pub fn hash(&self) -> RootResult<Hash> {
        Ok(hash_value(&self.record())?)
    }

    pub fn schema(&self) -> RootResult<TableSchema> {
        Ok(get_value(&*self.store, &self.schema)?)
    }

    pub fn rows(&self) -> &PersistentMap<RowKey, RowData> {
        &self.rows
    }

    pub fn row_count(&self) -> u64 {
        self.rows.len()
    }

    pub fn get_row(&self, key: &RowKey) -> RootResult<Option<Row>> {
        Ok(self.rows.get(key)?.map(|data| Row::new(key.clone(), data)))
    }

    /// same table with a different row map
    pub fn with_rows(&self, rows: PersistentMap<RowKey, RowData>) -> Self {
        Self {
            rows,
            ..self.clone()
        }
    }

    /// true if a conflict map is attached, even an empty one
    pub fn has_conflicts(&self) -> bool {
        self.conflicts.is_some()
    }

    pub fn num_rows_in_conflict(&self) -> u64 {
        self.conflicts.as_ref().map_or(0, PersistentMap::len)
    }

    pub fn conflicts(&self) -> Option<&PersistentMap<RowKey, Conflict>> {
        self.conflicts.as_ref()
    }

    pub fn with_conflicts(&self, conflicts: PersistentMap<RowKey, Conflict>) -> Self {
        Self {
            conflicts: Some(conflicts),
            ..self.clone()
        }
    }

    /// drop the conflict map entirely
    pub fn clear_conflicts(&self) -> Self {
        Self {
            conflicts: None,
            ..self.clone()
        }
    }

    pub fn violations(&self) -> Option<&PersistentMap<RowKey, ConstraintViolation>> {
        self.violations.as_ref()
    }

    pub fn with_violations(&self, violations: PersistentMap<RowKey, ConstraintViolation>) -> Self {
        Self {
            violations: Some(violations),
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("schema", &self.schema)
            .field("rows", &self.rows)
            .field("conflicts", &self.num_rows_in_conflict())
            .finish()
    }
}
