//! Core Git repository wrapper.
//!
//! Wraps `git2::Repository` with thread-safe access. The object database
//! doubles as the content-addressed value store (every value is a git blob),
//! and commits/refs carry the version history of root values.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::Repository;
use parking_lot::Mutex;

use crate::storage::commit::{self, Commit, CommitBuilder, CommitSpec, HistoryIterator};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::RefManager;
use crate::storage::store::{SharedStore, ValueStore};
use crate::storage::types::{BranchName, CommitId, GitSignature, Hash};

/// The main Git repository wrapper.
///
/// Clone this to share across threads - it uses Arc internally. The git
/// handle is `Send` but not `Sync`, so access is serialized by a mutex.
#[derive(Clone)]
pub struct GitRepository {
    inner: Arc<GitRepositoryInner>,
}

struct GitRepositoryInner {
    repo: Mutex<Repository>,
    path: PathBuf,
    signature: GitSignature,
}

impl GitRepository {
    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>, signature: GitSignature) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|_| StorageError::NotInitialized(path.to_path_buf()))?;
        Ok(Self::wrap(repo, path, signature))
    }

    /// Initialize a new, empty repository. Callers create the initial commit.
    pub fn init(path: impl AsRef<Path>, signature: GitSignature) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::init(path)?;
        Ok(Self::wrap(repo, path, signature))
    }

    fn wrap(repo: Repository, path: &Path, signature: GitSignature) -> Self {
        Self {
            inner: Arc::new(GitRepositoryInner {
                repo: Mutex::new(repo),
                path: path.to_path_buf(),
                signature,
            }),
        }
    }

    /// true if `path` already holds a repository
    pub fn exists(path: impl AsRef<Path>) -> bool {
        path.as_ref().join(".git").exists()
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn signature(&self) -> &GitSignature {
        &self.inner.signature
    }

    /// shared handle to the object database as a value store
    pub fn store(&self) -> SharedStore {
        Arc::new(self.clone())
    }

    /// Execute a function with access to the repository.
    ///
    /// The lock is not reentrant: `f` must not call back into this
    /// repository.
    pub fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.lock();
        f(&repo)
    }

    // ==================== History ====================

    /// name of the branch HEAD is attached to
    pub fn current_branch(&self) -> StorageResult<BranchName> {
        self.with_repo(|repo| {
            let head = repo.find_reference("HEAD")?;
            let target = head
                .symbolic_target()
                .ok_or_else(|| StorageError::RefNotFound("HEAD is detached".to_string()))?;
            Ok(BranchName::from_ref_path(target)?)
        })
    }

    /// Get the commit HEAD points at.
    pub fn head(&self) -> StorageResult<CommitId> {
        self.with_repo(RefManager::head_commit)
    }

    pub fn resolve_branch(&self, branch: &BranchName) -> StorageResult<CommitId> {
        self.with_repo(|repo| RefManager::resolve_branch(repo, branch))
    }

    pub fn get_commit(&self, id: CommitId) -> StorageResult<Commit> {
        self.with_repo(|repo| commit::get_commit(repo, id))
    }

    /// Resolve a commit spec, reading `HEAD` through `current_branch`.
    pub fn resolve(&self, spec: &CommitSpec, current_branch: &BranchName) -> StorageResult<Commit> {
        self.with_repo(|repo| commit::resolve_commit(repo, spec, current_branch))
    }

    /// Create a commit snapshotting `root`. No ref is moved.
    pub fn create_commit(&self, root: Hash, parents: Vec<CommitId>, message: &str) -> StorageResult<CommitId> {
        self.with_repo(|repo| {
            CommitBuilder::new(repo)
                .root(root)
                .parents(parents)
                .message(message)
                .signature(self.inner.signature.clone())
                .commit()
        })
    }

    /// Point `branch` at `commit`, the only operation that rewrites history.
    pub fn set_head_to_commit(&self, branch: &BranchName, commit: CommitId) -> StorageResult<()> {
        self.with_repo(|repo| RefManager::update_branch(repo, branch, commit))
    }

    /// Create `main` at `commit` and attach HEAD to it.
    pub fn init_main_branch(&self, commit: CommitId) -> StorageResult<()> {
        self.with_repo(|repo| RefManager::init_main_branch(repo, commit))
    }

    pub fn create_branch(&self, branch: &BranchName, at: CommitId) -> StorageResult<()> {
        self.with_repo(|repo| RefManager::create_branch(repo, branch, at))
    }

    pub fn list_branches(&self) -> StorageResult<Vec<BranchName>> {
        self.with_repo(RefManager::list_branches)
    }

    /// Commits reachable from `from`, newest first.
    pub fn history(&self, from: CommitId, limit: Option<usize>) -> StorageResult<Vec<Commit>> {
        self.with_repo(|repo| {
            let iter = HistoryIterator::new(repo, from)?;
            match limit {
                Some(n) => iter.take(n).collect(),
                None => iter.collect(),
            }
        })
    }
}

impl ValueStore for GitRepository {
    fn get(&self, hash: &Hash) -> StorageResult<Option<Vec<u8>>> {
        let oid = hash.to_oid()?;
        self.with_repo(|repo| match repo.find_blob(oid) {
            Ok(blob) => Ok(Some(blob.content().to_vec())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(StorageError::Git(e)),
        })
    }

    fn put(&self, bytes: &[u8]) -> StorageResult<Hash> {
        self.with_repo(|repo| Ok(Hash::from_oid(repo.blob(bytes)?)))
    }
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository")
            .field("path", &self.inner.path)
            .finish()
    }
}
