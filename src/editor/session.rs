//! Table edit sessions: row edits across every table of one root.

use std::collections::BTreeMap;

use tracing::debug;

use crate::editor::error::{EditError, EditResult};
use crate::editor::table_editor::TableEditor;
use crate::map::BuildMode;
use crate::root::{Row, RowData, RootValue, Table, TableSchema};
use crate::storage::{RowKey, TableName};

/// Settings shared by every editor in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorProps {
    pub foreign_key_checks_disabled: bool,
    pub build_mode: BuildMode,
}

impl Default for EditorProps {
    fn default() -> Self {
        Self {
            foreign_key_checks_disabled: false,
            build_mode: BuildMode::default(),
        }
    }
}

/// Buffers edits for the tables of one root until [`flush`](Self::flush).
///
/// Table editors are created lazily on first access. Rebasing with
/// [`set_root`](Self::set_root) drops every unflushed edit.
#[derive(Debug)]
pub struct TableEditSession {
    props: EditorProps,
    root: Option<RootValue>,
    editors: BTreeMap<TableName, TableEditor>,
}

impl TableEditSession {
    pub fn new(props: EditorProps) -> Self {
        Self {
            props,
            root: None,
            editors: BTreeMap::new(),
        }
    }

    pub fn with_root(root: RootValue, props: EditorProps) -> Self {
        let mut session = Self::new(props);
        session.root = Some(root);
        session
    }

    pub fn props(&self) -> EditorProps {
        self.props
    }

    pub fn set_foreign_key_checks_disabled(&mut self, disabled: bool) {
        self.props.foreign_key_checks_disabled = disabled;
    }

    /// Rebase onto `root`, discarding pending edits.
    pub fn set_root(&mut self, root: RootValue) {
        if !self.editors.is_empty() {
            debug!(editors = self.editors.len(), "dropping table editors on rebase");
        }
        self.editors.clear();
        self.root = Some(root);
    }

    /// the base root, without pending edits
    pub fn root(&self) -> Option<&RootValue> {
        self.root.as_ref()
    }

    fn base(&self) -> EditResult<&RootValue> {
        self.root.as_ref().ok_or(EditError::NoRoot)
    }

    pub fn is_dirty(&self) -> bool {
        self.editors.values().any(TableEditor::is_dirty)
    }

    pub fn table_names(&self) -> EditResult<Vec<TableName>> {
        Ok(self.base()?.table_names()?)
    }

    pub fn has_table(&self, name: &TableName) -> EditResult<bool> {
        Ok(self.base()?.has_table(name)?)
    }

    /// Add an empty table to the root.
    pub fn create_table(&mut self, name: &TableName, schema: &TableSchema) -> EditResult<()> {
        let root = self.base()?;
        if root.has_table(name)? {
            return Err(EditError::TableAlreadyExists(name.to_string()));
        }
        let table = Table::empty(root.store().clone(), schema)?;
        let root = root.put_table(name, &table)?;
        self.root = Some(root);
        Ok(())
    }

    /// Remove a table and any edits buffered for it.
    pub fn drop_table(&mut self, name: &TableName) -> EditResult<()> {
        let root = self.base()?;
        if !root.has_table(name)? {
            return Err(EditError::TableNotFound(name.to_string()));
        }
        let root = root.remove_tables(std::slice::from_ref(name))?;
        self.editors.remove(name);
        self.root = Some(root);
        Ok(())
    }

    /// The editor for `name`, loading the base table on first use.
    pub fn editor(&mut self, name: &TableName) -> EditResult<&mut TableEditor> {
        if !self.editors.contains_key(name) {
            let table = self
                .base()?
                .get_table(name)?
                .ok_or_else(|| EditError::TableNotFound(name.to_string()))?;
            self.editors.insert(name.clone(), TableEditor::new(name.clone(), table)?);
        }
        self.editors
            .get_mut(name)
            .ok_or_else(|| EditError::TableNotFound(name.to_string()))
    }

    pub fn schema(&mut self, name: &TableName) -> EditResult<TableSchema> {
        Ok(self.editor(name)?.schema().clone())
    }

    pub fn insert_row(&mut self, name: &TableName, data: RowData) -> EditResult<RowKey> {
        self.editor(name)?.insert_row(data)
    }

    pub fn update_row(&mut self, name: &TableName, key: &RowKey, updates: RowData) -> EditResult<()> {
        self.editor(name)?.update_row(key, updates)
    }

    pub fn delete_row(&mut self, name: &TableName, key: &RowKey) -> EditResult<()> {
        self.editor(name)?.delete_row(key)
    }

    pub fn get_row(&mut self, name: &TableName, key: &RowKey) -> EditResult<Option<Row>> {
        self.editor(name)?.get_row(key)
    }

    pub fn rows(&mut self, name: &TableName) -> EditResult<Vec<Row>> {
        self.editor(name)?.rows()
    }

    /// Write every pending edit into new tables and return the resulting
    /// root, which becomes the session's base.
    ///
    /// Editors keep their pending edits until the new root exists, so a
    /// failed flush can be retried without losing any table's edits.
    pub fn flush(&mut self) -> EditResult<RootValue> {
        let root = self.base()?.clone();
        if !self.is_dirty() {
            return Ok(root);
        }

        let mut built = Vec::new();
        let mut edits = BTreeMap::new();
        for (name, editor) in self.editors.iter().filter(|(_, e)| e.is_dirty()) {
            let table = editor.build(self.props.build_mode)?;
            edits.insert(name.clone(), Some(table.write()?));
            built.push((name.clone(), table));
        }
        let root = root.put_table_hashes(edits)?;

        for (name, table) in built {
            if let Some(editor) = self.editors.get_mut(&name) {
                editor.rebase(table);
            }
        }
        debug!(root = %root.hash_of().short(), "flushed edit session");
        self.root = Some(root.clone());
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Hash, MemoryStore, StorageError, StorageResult, ValueStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn name(s: &str) -> TableName {
        TableName::new(s).unwrap()
    }

    fn row(id: &str, v: i64) -> RowData {
        let mut data = RowData::new();
        data.insert("id".to_string(), json!(id));
        data.insert("v".to_string(), json!(v));
        data
    }

    fn session() -> TableEditSession {
        let root = RootValue::empty(MemoryStore::shared()).unwrap();
        let mut session = TableEditSession::with_root(root, EditorProps::default());
        session
            .create_table(&name("t"), &TableSchema::new(["id", "v"]).unwrap())
            .unwrap();
        session
    }

    #[test]
    fn test_no_root() {
        let mut session = TableEditSession::new(EditorProps::default());
        assert!(matches!(session.flush(), Err(EditError::NoRoot)));
        assert!(matches!(session.insert_row(&name("t"), row("a", 1)), Err(EditError::NoRoot)));
    }

    #[test]
    fn test_create_and_drop_table() {
        let mut session = session();
        assert!(matches!(
            session.create_table(&name("t"), &TableSchema::new(["id"]).unwrap()),
            Err(EditError::TableAlreadyExists(_))
        ));

        session.insert_row(&name("t"), row("a", 1)).unwrap();
        session.drop_table(&name("t")).unwrap();
        assert!(!session.is_dirty());
        assert!(session.table_names().unwrap().is_empty());
        assert!(matches!(session.drop_table(&name("t")), Err(EditError::TableNotFound(_))));
        assert!(matches!(session.rows(&name("t")), Err(EditError::TableNotFound(_))));
    }

    #[test]
    fn test_flush_produces_new_root() {
        let mut session = session();
        let before = session.root().unwrap().clone();

        session.insert_row(&name("t"), row("a", 1)).unwrap();
        session.insert_row(&name("t"), row("b", 2)).unwrap();
        assert_eq!(session.root().unwrap(), &before);

        let root = session.flush().unwrap();
        assert_ne!(root, before);
        assert!(!session.is_dirty());

        let table = root.get_table(&name("t")).unwrap().unwrap();
        assert_eq!(table.row_count(), 2);

        // flushing again changes nothing
        assert_eq!(session.flush().unwrap(), root);
    }

    #[test]
    fn test_set_root_drops_edits() {
        let mut session = session();
        let base = session.root().unwrap().clone();

        session.insert_row(&name("t"), row("a", 1)).unwrap();
        session.set_root(base.clone());

        assert!(!session.is_dirty());
        assert!(session.rows(&name("t")).unwrap().is_empty());
        assert_eq!(session.flush().unwrap(), base);
    }

    #[test]
    fn test_threaded_and_inline_flush_agree() {
        let store = MemoryStore::shared();
        let schema = TableSchema::new(["id", "v"]).unwrap();
        let mut roots = Vec::new();

        for mode in [BuildMode::Inline, BuildMode::Threaded { capacity: 2 }] {
            let root = RootValue::empty(store.clone()).unwrap();
            let props = EditorProps {
                build_mode: mode,
                ..EditorProps::default()
            };
            let mut session = TableEditSession::with_root(root, props);
            session.create_table(&name("t"), &schema).unwrap();
            for i in 0..200 {
                session.insert_row(&name("t"), row(&format!("k{:03}", i), i)).unwrap();
            }
            roots.push(session.flush().unwrap());
        }

        assert_eq!(roots[0], roots[1]);
    }

    /// rejects any value mentioning `marker` while `failing` is set
    struct RejectingStore {
        marker: &'static str,
        failing: AtomicBool,
        inner: MemoryStore,
    }

    impl ValueStore for RejectingStore {
        fn get(&self, hash: &Hash) -> StorageResult<Option<Vec<u8>>> {
            self.inner.get(hash)
        }

        fn put(&self, bytes: &[u8]) -> StorageResult<Hash> {
            let text = String::from_utf8_lossy(bytes);
            if self.failing.load(Ordering::SeqCst) && text.contains(self.marker) {
                return Err(StorageError::Internal("write rejected".to_string()));
            }
            self.inner.put(bytes)
        }
    }

    #[test]
    fn test_failed_flush_keeps_every_table_edit() {
        let store = Arc::new(RejectingStore {
            marker: "rejected-row",
            failing: AtomicBool::new(true),
            inner: MemoryStore::new(),
        });
        let root = RootValue::empty(store.clone()).unwrap();
        let props = EditorProps {
            build_mode: BuildMode::Inline,
            ..EditorProps::default()
        };
        let mut session = TableEditSession::with_root(root, props);
        let schema = TableSchema::new(["id", "v"]).unwrap();
        session.create_table(&name("a"), &schema).unwrap();
        session.create_table(&name("b"), &schema).unwrap();
        let base = session.root().unwrap().clone();

        session.insert_row(&name("a"), row("a1", 1)).unwrap();
        session.insert_row(&name("b"), row("rejected-row", 2)).unwrap();

        assert!(session.flush().is_err());
        assert_eq!(session.root().unwrap(), &base);
        assert!(session.is_dirty());
        assert_eq!(session.rows(&name("a")).unwrap().len(), 1);

        store.failing.store(false, Ordering::SeqCst);
        let root = session.flush().unwrap();
        assert!(!session.is_dirty());
        for table in ["a", "b"] {
            assert_eq!(root.get_table(&name(table)).unwrap().unwrap().row_count(), 1);
        }
    }
}
