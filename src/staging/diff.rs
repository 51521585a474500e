//! Table and doc level differences between two roots.

use std::fmt;

use crate::root::{union_doc_names, union_table_names, DocName, RootResult, RootValue};
use crate::storage::TableName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    Added,
    Dropped,
    Modified,
}

impl DeltaKind {
    fn between<T: PartialEq>(from: Option<T>, to: Option<T>) -> Option<Self> {
        match (from, to) {
            (None, Some(_)) => Some(DeltaKind::Added),
            (Some(_), None) => Some(DeltaKind::Dropped),
            (Some(a), Some(b)) if a != b => Some(DeltaKind::Modified),
            _ => None,
        }
    }

    /// one-letter status label
    pub fn label(&self) -> &'static str {
        match self {
            DeltaKind::Added => "A",
            DeltaKind::Dropped => "D",
            DeltaKind::Modified => "M",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDelta {
    pub name: TableName,
    pub kind: DeltaKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocDelta {
    pub name: DocName,
    pub kind: DeltaKind,
}

/// Compare table hashes. Renames show up as a drop plus an add.
pub fn table_deltas(from: &RootValue, to: &RootValue) -> RootResult<Vec<TableDelta>> {
    let mut deltas = Vec::new();
    for name in union_table_names(from, to)? {
        let kind = DeltaKind::between(from.get_table_hash(&name)?, to.get_table_hash(&name)?);
        if let Some(kind) = kind {
            deltas.push(TableDelta { name, kind });
        }
    }
    Ok(deltas)
}

pub fn doc_deltas(from: &RootValue, to: &RootValue) -> RootResult<Vec<DocDelta>> {
    let mut deltas = Vec::new();
    for name in union_doc_names(from, to)? {
        if let Some(kind) = DeltaKind::between(from.get_doc_hash(name)?, to.get_doc_hash(name)?) {
            deltas.push(DocDelta { name, kind });
        }
    }
    Ok(deltas)
}

/// Tracked changes in Working that are not staged.
///
/// Prints as the listing shown after a soft reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnstagedReport {
    pub entries: Vec<(DeltaKind, String)>,
}

impl fmt::Display for UnstagedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Unstaged changes after reset:")?;
        for (kind, name) in &self.entries {
            writeln!(f, "{}\t{}", kind.label(), name)?;
        }
        Ok(())
    }
}

/// Modified and dropped tables and docs between Staged and Working.
/// New, untracked entries are left out. Returns `None` when nothing changed.
pub fn unstaged_changes(staged: &RootValue, working: &RootValue) -> RootResult<Option<UnstagedReport>> {
    let mut entries = Vec::new();

    for delta in table_deltas(staged, working)? {
        if delta.kind != DeltaKind::Added {
            entries.push((delta.kind, delta.name.to_string()));
        }
    }
    for delta in doc_deltas(staged, working)? {
        if delta.kind != DeltaKind::Added {
            entries.push((delta.kind, delta.name.to_string()));
        }
    }

    if entries.is_empty() {
        return Ok(None);
    }
    Ok(Some(UnstagedReport { entries }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::testing::{name, setup, with_table};

    #[test]
    fn test_table_deltas() {
        let (_dir, env) = setup();
        let empty = env.working_root().unwrap();
        let from = with_table(&env, &empty, "kept", &["id"]);
        let from = with_table(&env, &from, "gone", &["id"]);
        let from = with_table(&env, &from, "changed", &["id"]);

        let to = from.remove_tables(&[name("gone")]).unwrap();
        let to = with_table(&env, &to, "changed", &["id", "extra"]);
        let to = with_table(&env, &to, "fresh", &["id"]);

        let deltas = table_deltas(&from, &to).unwrap();
        assert_eq!(
            deltas,
            vec![
                TableDelta { name: name("changed"), kind: DeltaKind::Modified },
                TableDelta { name: name("fresh"), kind: DeltaKind::Added },
                TableDelta { name: name("gone"), kind: DeltaKind::Dropped },
            ]
        );
    }

    #[test]
    fn test_unstaged_report_skips_new_tables() {
        let (_dir, env) = setup();
        let empty = env.working_root().unwrap();
        let staged = with_table(&env, &empty, "a", &["id"]);
        let staged = with_table(&env, &staged, "b", &["id"]);

        let working = staged.remove_tables(&[name("a")]).unwrap();
        let working = with_table(&env, &working, "b", &["id", "v"]);
        let working = with_table(&env, &working, "c", &["id"]);
        let working = working
            .put_docs(&[(DocName::License, Some("MIT".to_string()))])
            .unwrap();

        let report = unstaged_changes(&staged, &working).unwrap().unwrap();
        assert_eq!(report.to_string(), "Unstaged changes after reset:\nD\ta\nM\tb\n");

        assert!(unstaged_changes(&staged, &staged).unwrap().is_none());
    }
}
