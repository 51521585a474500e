//! Buffered row edits against one table.

use std::collections::BTreeMap;

use tracing::debug;

use crate::editor::error::{EditError, EditResult};
use crate::map::{BuildMode, MapBuildError, MapBuilder, PersistentMap};
use crate::root::{Row, RowData, Table, TableSchema};
use crate::storage::{RowKey, TableName};

/// Pending inserts, updates and deletes over a base table.
///
/// Edits are keyed by row key: `Some(data)` is the row's new contents,
/// `None` deletes it. Reads see the base table with the edits applied.
pub struct TableEditor {
    name: TableName,
    base: Table,
    schema: TableSchema,
    pending: BTreeMap<RowKey, Option<RowData>>,
}

impl TableEditor {
    pub fn new(name: TableName, base: Table) -> EditResult<Self> {
        let schema = base.schema()?;
        Ok(Self {
            name,
            base,
            schema,
            pending: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &TableName {
        &self.name
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    fn check_columns<'a>(&self, columns: impl Iterator<Item = &'a String>) -> EditResult<()> {
        for column in columns {
            if !self.schema.has_column(column) {
                return Err(EditError::UnknownColumn {
                    table: self.name.to_string(),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn get_row(&self, key: &RowKey) -> EditResult<Option<Row>> {
        match self.pending.get(key) {
            Some(Some(data)) => Ok(Some(Row::new(key.clone(), data.clone()))),
            Some(None) => Ok(None),
            None => Ok(self.base.get_row(key)?),
        }
    }

    pub fn contains_row(&self, key: &RowKey) -> EditResult<bool> {
        Ok(self.get_row(key)?.is_some())
    }

    pub fn insert_row(&mut self, data: RowData) -> EditResult<RowKey> {
        self.check_columns(data.keys())?;
        let row = Row::from_data(&self.schema, data)?;

        if self.contains_row(&row.key)? {
            return Err(EditError::RowAlreadyExists {
                table: self.name.to_string(),
                key: row.key.to_string(),
            });
        }

        self.pending.insert(row.key.clone(), Some(row.data));
        Ok(row.key)
    }

    /// Merge `updates` into an existing row. The primary key column may only
    /// be set to its current value.
    pub fn update_row(&mut self, key: &RowKey, updates: RowData) -> EditResult<()> {
        self.check_columns(updates.keys())?;
        let mut row = self.get_row(key)?.ok_or_else(|| EditError::RowNotFound {
            table: self.name.to_string(),
            key: key.to_string(),
        })?;

        if let Some(pk) = updates.get(&self.schema.primary_key) {
            if row.get(&self.schema.primary_key) != Some(pk) {
                return Err(EditError::PrimaryKeyChanged {
                    table: self.name.to_string(),
                });
            }
        }

        row.merge_data(updates);
        self.pending.insert(row.key, Some(row.data));
        Ok(())
    }

    pub fn delete_row(&mut self, key: &RowKey) -> EditResult<()> {
        if !self.contains_row(key)? {
            return Err(EditError::RowNotFound {
                table: self.name.to_string(),
                key: key.to_string(),
            });
        }
        self.pending.insert(key.clone(), None);
        Ok(())
    }

    /// all rows in key order, edits applied
    pub fn rows(&self) -> EditResult<Vec<Row>> {
        let mut merged: BTreeMap<RowKey, RowData> = BTreeMap::new();
        for entry in self.base.rows().iter() {
            let (key, data) = entry?;
            merged.insert(key, data);
        }
        for (key, edit) in &self.pending {
            match edit {
                Some(data) => {
                    merged.insert(key.clone(), data.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().map(|(key, data)| Row::new(key, data)).collect())
    }

    /// Merge the base rows with pending edits into a new table. The editor
    /// itself is left untouched; see [`rebase`](Self::rebase).
    pub fn build(&self, mode: BuildMode) -> EditResult<Table> {
        if self.pending.is_empty() {
            return Ok(self.base.clone());
        }

        let mut builder = MapBuilder::new(self.base.rows().store().clone(), mode)?;
        let merged = merge_rows(self.base.rows(), &self.pending, &mut builder);
        let closed = builder.close();
        merged?;
        closed?;
        let rows = builder.into_map().ok_or(MapBuildError::Aborted)?;

        debug!(table = %self.name, edits = self.pending.len(), rows = rows.len(), "built table edits");
        Ok(self.base.with_rows(rows))
    }

    /// Adopt `table` as the new base and drop pending edits.
    pub fn rebase(&mut self, table: Table) {
        self.base = table;
        self.pending.clear();
    }

    /// [`build`](Self::build), then [`rebase`](Self::rebase) onto the result.
    pub fn flush(&mut self, mode: BuildMode) -> EditResult<Table> {
        let table = self.build(mode)?;
        self.rebase(table.clone());
        Ok(table)
    }
}

/// Stream a merge-join of the base rows and the sorted edits into `builder`.
fn merge_rows(
    base: &PersistentMap<RowKey, RowData>,
    pending: &BTreeMap<RowKey, Option<RowData>>,
    builder: &mut MapBuilder<RowKey, RowData>,
) -> EditResult<()> {
    let mut base = base.iter();
    let mut current = base.next().transpose()?;
    let mut edits = pending.iter().peekable();

    loop {
        let edit_key = edits.peek().map(|(key, _)| *key);
        match (current.as_ref(), edit_key) {
            (None, None) => break,
            (Some((base_key, _)), Some(edit_key)) if edit_key <= base_key => {
                let replaces_base = edit_key == base_key;
                if let Some((key, Some(data))) = edits.next() {
                    builder.write(key.clone(), data.clone())?;
                }
                if replaces_base {
                    current = base.next().transpose()?;
                }
            }
            (Some(_), _) => {
                if let Some((key, data)) = current.take() {
                    builder.write(key, data)?;
                }
                current = base.next().transpose()?;
            }
            (None, Some(_)) => {
                if let Some((key, Some(data))) = edits.next() {
                    builder.write(key.clone(), data.clone())?;
                }
            }
        }
    }
    Ok(())
}

impl std::fmt::Debug for TableEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableEditor")
            .field("name", &self.name)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn data(id: i64, name: &str) -> RowData {
        let mut data = RowData::new();
        data.insert("id".to_string(), json!(id));
        data.insert("name".to_string(), json!(name));
        data
    }

    fn key(id: i64) -> RowKey {
        RowKey::new(id.to_string()).unwrap()
    }

    fn editor_with(ids: &[i64]) -> TableEditor {
        let store = MemoryStore::shared();
        let schema = TableSchema::new(["id", "name"]).unwrap();
        let rows = ids
            .iter()
            .map(|id| Row::from_data(&schema, data(*id, "base")).unwrap())
            .collect();
        let table = Table::from_rows(store, &schema, rows, BuildMode::Inline).unwrap();
        TableEditor::new(TableName::new("people").unwrap(), table).unwrap()
    }

    #[test]
    fn test_insert_and_duplicate() {
        let mut editor = editor_with(&[1]);
        editor.insert_row(data(2, "new")).unwrap();
        assert!(editor.is_dirty());

        assert!(matches!(
            editor.insert_row(data(1, "dup")),
            Err(EditError::RowAlreadyExists { .. })
        ));
        assert!(matches!(
            editor.insert_row(data(2, "dup")),
            Err(EditError::RowAlreadyExists { .. })
        ));
    }

    #[test]
    fn test_update_and_delete_missing() {
        let mut editor = editor_with(&[1]);

        assert!(matches!(
            editor.update_row(&key(9), RowData::new()),
            Err(EditError::RowNotFound { .. })
        ));
        assert!(matches!(editor.delete_row(&key(9)), Err(EditError::RowNotFound { .. })));

        editor.delete_row(&key(1)).unwrap();
        assert!(editor.get_row(&key(1)).unwrap().is_none());
        assert!(matches!(editor.delete_row(&key(1)), Err(EditError::RowNotFound { .. })));

        // deleted rows can be inserted again
        editor.insert_row(data(1, "again")).unwrap();
        assert_eq!(editor.get_row(&key(1)).unwrap().unwrap().get("name"), Some(&json!("again")));
    }

    #[test]
    fn test_primary_key_and_columns_checked() {
        let mut editor = editor_with(&[1]);

        let mut change_pk = RowData::new();
        change_pk.insert("id".to_string(), json!(2));
        assert!(matches!(
            editor.update_row(&key(1), change_pk),
            Err(EditError::PrimaryKeyChanged { .. })
        ));

        let mut same_pk = RowData::new();
        same_pk.insert("id".to_string(), json!(1));
        same_pk.insert("name".to_string(), json!("renamed"));
        editor.update_row(&key(1), same_pk).unwrap();

        let mut unknown = data(5, "x");
        unknown.insert("age".to_string(), json!(3));
        assert!(matches!(editor.insert_row(unknown), Err(EditError::UnknownColumn { .. })));
    }

    #[test]
    fn test_flush_merges_in_key_order() {
        let mut editor = editor_with(&[1, 3, 5, 7]);
        editor.insert_row(data(0, "first")).unwrap();
        editor.insert_row(data(4, "middle")).unwrap();
        editor.insert_row(data(9, "last")).unwrap();
        editor.delete_row(&key(3)).unwrap();

        let mut update = RowData::new();
        update.insert("name".to_string(), json!("changed"));
        editor.update_row(&key(7), update).unwrap();

        let expected = editor.rows().unwrap();
        let table = editor.flush(BuildMode::default()).unwrap();
        assert!(!editor.is_dirty());

        let keys: Vec<String> = table
            .rows()
            .keys()
            .unwrap()
            .into_iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(keys, vec!["0", "1", "4", "5", "7", "9"]);
        assert_eq!(table.row_count(), 6);
        assert_eq!(editor.rows().unwrap(), expected);
        assert_eq!(
            table.get_row(&key(7)).unwrap().unwrap().get("name"),
            Some(&json!("changed"))
        );
    }

    #[test]
    fn test_flush_matches_fresh_build() {
        let mut editor = editor_with(&[2, 4]);
        editor.insert_row(data(3, "base")).unwrap();
        let flushed = editor.flush(BuildMode::Inline).unwrap();

        let direct = editor_with(&[2, 3, 4]);
        assert_eq!(flushed.rows().hash(), direct.base.rows().hash());
    }

    #[test]
    fn test_flush_without_edits_is_base() {
        let mut editor = editor_with(&[1, 2]);
        let before = editor.base.hash().unwrap();
        assert_eq!(editor.flush(BuildMode::default()).unwrap().hash().unwrap(), before);
    }
}
