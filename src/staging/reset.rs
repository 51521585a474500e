//! Soft and hard resets, plus the argument handling of the `reset` command.

use tracing::{debug, info, warn};

use crate::env::{RepoEnv, RootKind};
use crate::root::{union_doc_names, union_table_names, RootValue, DOCS_TABLE_NAME};
use crate::staging::diff::{unstaged_changes, UnstagedReport};
use crate::staging::error::{StagingError, StagingResult};
use crate::staging::stage::{move_docs_between_roots, move_tables_between_roots, split_tables_and_docs, validate_tables};
use crate::storage::{Commit, CommitSpec};

/// Result of a soft reset.
#[derive(Debug)]
pub struct SoftReset {
    pub staged: RootValue,
    /// `None` when nothing is left unstaged or the report could not be built
    pub unstaged: Option<UnstagedReport>,
}

/// Copy the named tables and docs from Head back into Staged.
///
/// No names, or the single name `.`, resets every table in Staged or Head.
/// Working is not touched.
pub fn reset_soft(env: &RepoEnv, names: &[String]) -> StagingResult<SoftReset> {
    let staged = env.staged_root()?;
    let head = env.head_root()?;

    let (tables, docs) = if names.is_empty() || (names.len() == 1 && names[0] == ".") {
        (union_table_names(&staged, &head)?, union_doc_names(&staged, &head)?)
    } else {
        let (tables, docs) = split_tables_and_docs(names);
        (validate_tables(&tables, &[&staged, &head])?, docs)
    };

    let staged = move_tables_between_roots(&tables, &head, &staged)?;
    let staged = move_docs_between_roots(&docs, &head, &staged)?;
    let hash = env.update_staged_root(&staged)?;
    info!(tables = tables.len(), staged = %hash.short(), "soft reset");

    let unstaged = match report_unstaged(env, &staged) {
        Ok(report) => report,
        Err(e) => {
            debug!(error = %e, "could not list unstaged changes");
            None
        }
    };

    Ok(SoftReset { staged, unstaged })
}

fn report_unstaged(env: &RepoEnv, staged: &RootValue) -> StagingResult<Option<UnstagedReport>> {
    let working = env.working_root()?;
    Ok(unstaged_changes(staged, &working)?)
}

/// Point Working and Staged at the root of `spec` (default `HEAD`), then
/// move the current branch to that commit.
///
/// If the branch cannot be moved the previous Working and Staged pointers
/// are put back and the ref error returned.
pub fn reset_hard(env: &RepoEnv, spec: Option<&str>) -> StagingResult<Commit> {
    let spec = match spec {
        Some(text) => CommitSpec::parse(text)?,
        None => CommitSpec::head(),
    };
    let commit = env.resolve_commit(&spec)?;
    let root = env.read_root(commit.root, RootKind::Head)?;
    let branch = env.head_branch()?;
    let previous = env.repo_state();

    env.update_roots(&root, &root)?;

    if let Err(e) = env.db().set_head_to_commit(&branch, commit.id) {
        warn!(branch = %branch, commit = %commit.id.short(), error = %e, "branch update failed, restoring roots");
        if let Err(restore) = env.set_root_hashes(previous.working, previous.staged) {
            warn!(error = %restore, "could not restore previous roots");
        }
        return Err(e.into());
    }

    info!(branch = %branch, commit = %commit.id.short(), spec = %spec, "hard reset");
    Ok(commit)
}

/// A validated `reset` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetRequest {
    Hard { commit: Option<String> },
    Soft { names: Vec<String> },
}

#[derive(Debug)]
pub enum ResetOutcome {
    Hard(Commit),
    Soft(SoftReset),
}

impl ResetRequest {
    /// Validate command-line flags and positionals without touching the
    /// repository.
    pub fn from_args(hard: bool, soft: bool, args: &[String]) -> StagingResult<Self> {
        if hard && soft {
            return Err(StagingError::MutuallyExclusive);
        }
        if let Some(docs) = args.iter().find(|a| a.as_str() == DOCS_TABLE_NAME) {
            return Err(StagingError::DocsTableArgument(docs.clone()));
        }

        if hard {
            if args.len() > 1 {
                return Err(StagingError::TooManyArguments);
            }
            return Ok(ResetRequest::Hard {
                commit: args.first().cloned(),
            });
        }

        Ok(ResetRequest::Soft { names: args.to_vec() })
    }

    pub fn run(&self, env: &RepoEnv) -> StagingResult<ResetOutcome> {
        match self {
            ResetRequest::Hard { commit } => reset_hard(env, commit.as_deref()).map(ResetOutcome::Hard),
            ResetRequest::Soft { names } => reset_soft(env, names).map(ResetOutcome::Soft),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::EnvError;
    use crate::staging::stage::stage_tables;
    use crate::staging::testing::{name, names, setup, table_hash, with_table};
    use crate::storage::StorageError;

    #[test]
    fn test_stage_then_soft_reset_scenario() {
        let (_dir, env) = setup();
        let working = with_table(&env, &env.working_root().unwrap(), "A", &["id"]);
        let working = with_table(&env, &working, "B", &["id", "x"]);
        env.update_working_root(&working).unwrap();

        stage_tables(&env, &names(&["A"])).unwrap();
        let staged = env.staged_root().unwrap();
        assert_eq!(staged.table_names().unwrap(), vec![name("A")]);
        assert_eq!(table_hash(&staged, "A"), table_hash(&working, "A"));

        // head has no A, so resetting everything empties Staged again
        let outcome = reset_soft(&env, &[]).unwrap();
        assert!(outcome.staged.table_names().unwrap().is_empty());
        assert_eq!(env.staged_hash(), env.head_root().unwrap().hash_of());
        assert_eq!(env.working_hash(), working.hash_of());
    }

    #[test]
    fn test_soft_reset_dot_matches_no_args() {
        let (_dir, env) = setup();
        let root = with_table(&env, &env.working_root().unwrap(), "t", &["id"]);
        env.update_roots(&root, &root).unwrap();
        env.commit_staged("add t").unwrap();

        let staged = with_table(&env, &root, "t", &["id", "v"]);
        let staged = with_table(&env, &staged, "u", &["id"]);
        env.update_staged_root(&staged).unwrap();

        let dot = reset_soft(&env, &names(&["."])).unwrap();
        assert_eq!(dot.staged.hash_of(), root.hash_of());

        env.update_staged_root(&staged).unwrap();
        let all = reset_soft(&env, &[]).unwrap();
        assert_eq!(all.staged.hash_of(), dot.staged.hash_of());
    }

    #[test]
    fn test_soft_reset_named_tables() {
        let (_dir, env) = setup();
        let head = with_table(&env, &env.working_root().unwrap(), "a", &["id"]);
        let head = with_table(&env, &head, "b", &["id"]);
        env.update_roots(&head, &head).unwrap();
        env.commit_staged("a and b").unwrap();

        let staged = with_table(&env, &head, "a", &["id", "1"]);
        let staged = with_table(&env, &staged, "b", &["id", "2"]);
        env.update_staged_root(&staged).unwrap();

        let outcome = reset_soft(&env, &names(&["a"])).unwrap();
        assert_eq!(table_hash(&outcome.staged, "a"), table_hash(&head, "a"));
        assert_eq!(table_hash(&outcome.staged, "b"), table_hash(&staged, "b"));

        let err = reset_soft(&env, &names(&["missing"])).unwrap_err();
        assert!(matches!(err, StagingError::TablesNotFound(ref n) if n == &names(&["missing"])));
    }

    #[test]
    fn test_soft_reset_reports_unstaged() {
        let (_dir, env) = setup();
        let head = with_table(&env, &env.working_root().unwrap(), "a", &["id"]);
        let head = with_table(&env, &head, "b", &["id"]);
        env.update_roots(&head, &head).unwrap();
        env.commit_staged("a and b").unwrap();

        let working = head.remove_tables(&[name("a")]).unwrap();
        let working = with_table(&env, &working, "b", &["id", "v"]);
        env.update_roots(&working, &working).unwrap();

        let outcome = reset_soft(&env, &[]).unwrap();
        let report = outcome.unstaged.unwrap();
        assert_eq!(report.to_string(), "Unstaged changes after reset:\nD\ta\nM\tb\n");
    }

    #[test]
    fn test_hard_reset_to_head() {
        let (_dir, env) = setup();
        let head = env.head_root().unwrap();
        let dirty = with_table(&env, &head, "scratch", &["id"]);
        env.update_roots(&dirty, &dirty).unwrap();

        let commit = reset_hard(&env, None).unwrap();
        assert_eq!(commit.id, env.head_commit().unwrap().id);
        assert_eq!(env.working_hash(), head.hash_of());
        assert_eq!(env.staged_hash(), head.hash_of());
    }

    #[test]
    fn test_hard_reset_to_ancestor_moves_branch() {
        let (_dir, env) = setup();
        let first = env.head_commit().unwrap();

        let root = with_table(&env, &env.working_root().unwrap(), "t", &["id"]);
        env.update_roots(&root, &root).unwrap();
        env.commit_staged("add t").unwrap();

        let commit = reset_hard(&env, Some("HEAD~1")).unwrap();
        assert_eq!(commit.id, first.id);
        assert_eq!(env.head_commit().unwrap().id, first.id);

        let resolved = env.read_root(first.root, RootKind::Head).unwrap();
        assert_eq!(env.working_hash(), resolved.hash_of());
        assert_eq!(env.staged_hash(), resolved.hash_of());
    }

    #[test]
    fn test_hard_reset_restores_roots_when_branch_is_locked() {
        let (_dir, env) = setup();
        let root = with_table(&env, &env.working_root().unwrap(), "t", &["id"]);
        env.update_roots(&root, &root).unwrap();
        env.commit_staged("add t").unwrap();

        let head = env.head_commit().unwrap();
        let before = env.repo_state();
        std::fs::write(env.path().join(".git/refs/heads/main.lock"), b"").unwrap();

        assert!(matches!(
            reset_hard(&env, Some("HEAD~1")),
            Err(StagingError::Storage(_))
        ));
        assert_eq!(env.repo_state(), before);
        assert_eq!(env.head_commit().unwrap().id, head.id);
    }

    #[test]
    fn test_hard_reset_bad_spec_changes_nothing() {
        let (_dir, env) = setup();
        let before = env.repo_state();

        assert!(matches!(
            reset_hard(&env, Some("HEAD~5")),
            Err(StagingError::Env(EnvError::Storage(StorageError::RefNotFound(_))))
        ));
        assert!(matches!(
            reset_hard(&env, Some("not a spec")),
            Err(StagingError::Storage(StorageError::InvalidSpec(_)))
        ));
        assert_eq!(env.repo_state(), before);
    }

    #[test]
    fn test_request_flags() {
        let args = names(&["t"]);
        assert!(matches!(
            ResetRequest::from_args(true, true, &args),
            Err(StagingError::MutuallyExclusive)
        ));
        assert!(matches!(
            ResetRequest::from_args(true, true, &names(&[DOCS_TABLE_NAME])),
            Err(StagingError::MutuallyExclusive)
        ));
        assert!(matches!(
            ResetRequest::from_args(false, false, &names(&["a", DOCS_TABLE_NAME])),
            Err(StagingError::DocsTableArgument(_))
        ));
        assert!(matches!(
            ResetRequest::from_args(true, false, &names(&["HEAD", "HEAD~1"])),
            Err(StagingError::TooManyArguments)
        ));

        assert_eq!(
            ResetRequest::from_args(true, false, &[]).unwrap(),
            ResetRequest::Hard { commit: None }
        );
        assert_eq!(
            ResetRequest::from_args(false, false, &args).unwrap(),
            ResetRequest::Soft { names: args.clone() }
        );
        assert_eq!(
            ResetRequest::from_args(false, true, &args).unwrap(),
            ResetRequest::Soft { names: args }
        );
    }

    #[test]
    fn test_request_run() {
        let (_dir, env) = setup();
        let request = ResetRequest::from_args(true, false, &names(&["HEAD"])).unwrap();
        assert!(matches!(request.run(&env).unwrap(), ResetOutcome::Hard(_)));

        let request = ResetRequest::from_args(false, false, &[]).unwrap();
        match request.run(&env).unwrap() {
            ResetOutcome::Soft(soft) => assert!(soft.unstaged.is_none()),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
