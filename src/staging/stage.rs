//! Moving tables and docs from the working root into the staged root.

use std::collections::BTreeMap;

use tracing::info;

use crate::env::RepoEnv;
use crate::root::{union_doc_names, union_table_names, DocName, RootResult, RootValue, DOCS_TABLE_NAME};
use crate::staging::error::{StagingError, StagingResult};
use crate::storage::TableName;

/// Stage the named tables and docs.
///
/// Every table name must exist in Staged or Working. Conflict markers with
/// no conflicting rows are cleared; any table with conflicting rows fails the
/// whole call and nothing is written.
pub fn stage_tables(env: &RepoEnv, names: &[String]) -> StagingResult<()> {
    let (tables, docs) = split_tables_and_docs(names);

    let working = env.working_root()?;
    let staged = env.staged_root()?;
    let tables = validate_tables(&tables, &[&staged, &working])?;

    stage(env, &tables, &docs, working, staged)
}

/// Stage every table and doc present in Working or Staged.
pub fn stage_all(env: &RepoEnv) -> StagingResult<()> {
    let working = env.working_root()?;
    let staged = env.staged_root()?;

    let tables = union_table_names(&working, &staged)?;
    let docs = union_doc_names(&working, &staged)?;

    stage(env, &tables, &docs, working, staged)
}

fn stage(
    env: &RepoEnv,
    tables: &[TableName],
    docs: &[DocName],
    working: RootValue,
    staged: RootValue,
) -> StagingResult<()> {
    let working = check_tables_for_conflicts(tables, working)?;
    let staged = move_tables_between_roots(tables, &working, &staged)?;
    let staged = move_docs_between_roots(docs, &working, &staged)?;

    env.update_roots(&working, &staged)?;

    info!(tables = tables.len(), docs = docs.len(), staged = %staged.hash_of().short(), "staged changes");
    Ok(())
}

/// Separate doc names from table names. The docs system table is dropped.
pub fn split_tables_and_docs(names: &[String]) -> (Vec<String>, Vec<DocName>) {
    let mut tables = Vec::new();
    let mut docs = Vec::new();

    for name in names {
        if name == DOCS_TABLE_NAME {
            continue;
        }
        match DocName::parse(name) {
            Some(doc) => docs.push(doc),
            None => tables.push(name.clone()),
        }
    }

    (tables, docs)
}

/// Check that every name is a table in at least one of `roots`.
///
/// Reports all missing names at once, in input order.
pub fn validate_tables(names: &[String], roots: &[&RootValue]) -> StagingResult<Vec<TableName>> {
    let mut found = Vec::with_capacity(names.len());
    let mut missing = Vec::new();

    for name in names {
        let table = match TableName::new(name.as_str()) {
            Ok(table) => table,
            Err(_) => {
                missing.push(name.clone());
                continue;
            }
        };

        let mut exists = false;
        for root in roots {
            if root.has_table(&table)? {
                exists = true;
                break;
            }
        }

        if exists {
            found.push(table);
        } else {
            missing.push(name.clone());
        }
    }

    if !missing.is_empty() {
        return Err(StagingError::TablesNotFound(missing));
    }
    Ok(found)
}

/// Clear stale conflict markers on the named tables, or fail listing every
/// table that still has conflicting rows.
pub fn check_tables_for_conflicts(names: &[TableName], working: RootValue) -> StagingResult<RootValue> {
    let mut in_conflict = Vec::new();
    let mut cleared = Vec::new();

    for name in names {
        let Some(table) = working.get_table(name)? else {
            continue;
        };
        if !table.has_conflicts() {
            continue;
        }
        if table.num_rows_in_conflict() == 0 {
            cleared.push((name.clone(), table.clear_conflicts()));
        } else {
            in_conflict.push(name.to_string());
        }
    }

    if !in_conflict.is_empty() {
        return Err(StagingError::TablesInConflict(in_conflict));
    }

    let mut root = working;
    for (name, table) in cleared {
        root = root.put_table(&name, &table)?;
    }
    Ok(root)
}

/// Copy the named tables' hashes from `src` into `dest`. A table missing
/// from `src` is removed from `dest`.
pub fn move_tables_between_roots(names: &[TableName], src: &RootValue, dest: &RootValue) -> RootResult<RootValue> {
    let mut edits = BTreeMap::new();
    for name in names {
        edits.insert(name.clone(), src.get_table_hash(name)?);
    }
    dest.put_table_hashes(edits)
}

/// Copy the named docs' hashes from `src` into `dest`, removing docs missing
/// from `src`.
pub fn move_docs_between_roots(docs: &[DocName], src: &RootValue, dest: &RootValue) -> RootResult<RootValue> {
    let mut edits = BTreeMap::new();
    for doc in docs {
        edits.insert(*doc, src.get_doc_hash(*doc)?);
    }
    dest.put_doc_hashes(edits)
}
