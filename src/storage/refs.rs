//! Branch and reference management.
//!
//! Git refs are pointers to commits. Moving a branch ref is the only way
//! history changes; commits themselves are immutable.

use git2::{BranchType, Repository};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BranchName, CommitId};

/// Manages Git references (branches).
pub struct RefManager;

impl RefManager {
    /// Resolve a branch name to its current commit ID.
    pub fn resolve_branch(repo: &Repository, branch: &BranchName) -> StorageResult<CommitId> {
        let reference = repo
            .find_reference(&branch.as_ref_path())
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        let commit = reference
            .peel_to_commit()
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        Ok(CommitId::new(commit.id()))
    }

    /// Get the commit HEAD points at.
    pub fn head_commit(repo: &Repository) -> StorageResult<CommitId> {
        let head = repo.head().map_err(|e| {
            if e.code() == git2::ErrorCode::UnbornBranch {
                StorageError::EmptyRepository
            } else {
                StorageError::Git(e)
            }
        })?;

        let commit = head.peel_to_commit()?;
        Ok(CommitId::new(commit.id()))
    }

    pub fn branch_exists(repo: &Repository, branch: &BranchName) -> bool {
        repo.find_reference(&branch.as_ref_path()).is_ok()
    }

    /// Create a new branch pointing to the given commit.
    pub fn create_branch(repo: &Repository, branch: &BranchName, target: CommitId) -> StorageResult<()> {
        if Self::branch_exists(repo, branch) {
            return Err(StorageError::BranchAlreadyExists(branch.to_string()));
        }

        let commit = repo.find_commit(target.raw())?;
        repo.branch(branch.as_str(), &commit, false)?;

        Ok(())
    }

    /// Repoint an existing branch at `target`.
    pub fn update_branch(repo: &Repository, branch: &BranchName, target: CommitId) -> StorageResult<()> {
        let mut reference = repo
            .find_reference(&branch.as_ref_path())
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        reference.set_target(target.raw(), &format!("reset: moving to {}", target.short()))?;

        Ok(())
    }

    /// List all local branches.
    pub fn list_branches(repo: &Repository) -> StorageResult<Vec<BranchName>> {
        let branches = repo.branches(Some(BranchType::Local))?;

        let mut result = Vec::new();
        for branch_result in branches {
            let (branch, _) = branch_result?;
            if let Some(name) = branch.name()? {
                if let Ok(branch_name) = BranchName::new(name) {
                    result.push(branch_name);
                }
            }
        }

        Ok(result)
    }

    /// Create the main branch at `initial_commit` and point HEAD at it.
    pub fn init_main_branch(repo: &Repository, initial_commit: CommitId) -> StorageResult<()> {
        let main = BranchName::main();

        if !Self::branch_exists(repo, &main) {
            Self::create_branch(repo, &main, initial_commit)?;
        }

        repo.set_head(&main.as_ref_path())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::commit::CommitBuilder;
    use crate::storage::types::Hash;
    use tempfile::TempDir;

    fn commit_on(repo: &Repository, parents: Vec<CommitId>, message: &str) -> CommitId {
        let root = Hash::from_oid(repo.blob(message.as_bytes()).unwrap());
        CommitBuilder::new(repo)
            .root(root)
            .parents(parents)
            .message(message)
            .commit()
            .unwrap()
    }

    fn setup_repo_with_commit() -> (TempDir, Repository, CommitId) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        let commit_id = commit_on(&repo, Vec::new(), "initial");
        RefManager::init_main_branch(&repo, commit_id).unwrap();

        (dir, repo, commit_id)
    }

    #[test]
    fn test_head_commit() {
        let (_dir, repo, expected) = setup_repo_with_commit();
        let head = RefManager::head_commit(&repo).unwrap();
        assert_eq!(head, expected);
    }

    #[test]
    fn test_branch_lifecycle() {
        let (_dir, repo, base_commit) = setup_repo_with_commit();

        let branch = BranchName::new("feature").unwrap();

        assert!(!RefManager::branch_exists(&repo, &branch));
        RefManager::create_branch(&repo, &branch, base_commit).unwrap();
        assert!(RefManager::branch_exists(&repo, &branch));

        let resolved = RefManager::resolve_branch(&repo, &branch).unwrap();
        assert_eq!(resolved, base_commit);

        let names = RefManager::list_branches(&repo).unwrap();
        assert!(names.contains(&branch));
        assert!(names.contains(&BranchName::main()));
    }

    #[test]
    fn test_duplicate_branch_error() {
        let (_dir, repo, base_commit) = setup_repo_with_commit();
        let branch = BranchName::new("feature").unwrap();

        RefManager::create_branch(&repo, &branch, base_commit).unwrap();
        let result = RefManager::create_branch(&repo, &branch, base_commit);

        assert!(matches!(result, Err(StorageError::BranchAlreadyExists(_))));
    }

    #[test]
    fn test_update_branch_moves_head() {
        let (_dir, repo, first) = setup_repo_with_commit();
        let second = commit_on(&repo, vec![first], "second");

        RefManager::update_branch(&repo, &BranchName::main(), second).unwrap();
        assert_eq!(RefManager::head_commit(&repo).unwrap(), second);

        // moving backwards is allowed; resets do it
        RefManager::update_branch(&repo, &BranchName::main(), first).unwrap();
        assert_eq!(RefManager::head_commit(&repo).unwrap(), first);
    }

    #[test]
    fn test_missing_branch() {
        let (_dir, repo, first) = setup_repo_with_commit();
        let ghost = BranchName::new("ghost").unwrap();

        assert!(matches!(
            RefManager::resolve_branch(&repo, &ghost),
            Err(StorageError::RefNotFound(_))
        ));
        assert!(matches!(
            RefManager::update_branch(&repo, &ghost, first),
            Err(StorageError::RefNotFound(_))
        ));
    }
}
