//! Moving tables between the working, staged and head roots.
//!
//! Staging copies table hashes from Working into Staged. Resets copy them
//! from Head back into Staged (soft) or replace both roots with a commit's
//! root (hard). Every operation validates its inputs before writing.

mod diff;
mod error;
mod reset;
mod stage;

pub use diff::{doc_deltas, table_deltas, unstaged_changes, DeltaKind, DocDelta, TableDelta, UnstagedReport};
pub use error::{StagingError, StagingResult};
pub use reset::{reset_hard, reset_soft, ResetOutcome, ResetRequest, SoftReset};
pub use stage::{
    check_tables_for_conflicts, move_docs_between_roots, move_tables_between_roots, split_tables_and_docs,
    stage_all, stage_tables, validate_tables,
};

#[cfg(test)]
pub(crate) mod testing {
    use tempfile::TempDir;

    use crate::env::RepoEnv;
    use crate::root::{RootValue, Table, TableSchema};
    use crate::storage::{GitSignature, Hash, TableName};

    pub fn setup() -> (TempDir, RepoEnv) {
        let dir = TempDir::new().unwrap();
        let env = RepoEnv::init(dir.path(), "test", GitSignature::verdb()).unwrap();
        (dir, env)
    }

    pub fn name(s: &str) -> TableName {
        TableName::new(s).unwrap()
    }

    pub fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// put an empty table with the given columns; different columns give
    /// different table hashes
    pub fn with_table(env: &RepoEnv, root: &RootValue, table: &str, columns: &[&str]) -> RootValue {
        let schema = TableSchema::new(columns.iter().copied()).unwrap();
        let t = Table::empty(env.store(), &schema).unwrap();
        root.put_table(&name(table), &t).unwrap()
    }

    pub fn table_hash(root: &RootValue, table: &str) -> Option<Hash> {
        root.get_table_hash(&name(table)).unwrap()
    }
}
