//! A repository on disk: the git store plus its persisted state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::env::error::{EnvError, EnvResult, RootKind};
use crate::env::state::RepoState;
use crate::root::RootValue;
use crate::storage::{BranchName, Commit, CommitId, CommitSpec, GitRepository, GitSignature, Hash, SharedStore};

/// message of the commit created by [`RepoEnv::init`]
pub const INIT_COMMIT_MESSAGE: &str = "Initialize data repository";

/// Handle to one repository: its name, store, history and pointers.
///
/// Clone this to share across connections - it uses Arc internally. The
/// pointers are shared mutable state; callers serialize mutations of a
/// given repository.
#[derive(Clone)]
pub struct RepoEnv {
    inner: Arc<RepoEnvInner>,
}

struct RepoEnvInner {
    name: String,
    path: PathBuf,
    db: GitRepository,
    store: SharedStore,
    state: RwLock<RepoState>,
}

impl RepoEnv {
    /// Create a repository with an empty root committed on `main`.
    pub fn init(path: impl AsRef<Path>, name: impl Into<String>, signature: GitSignature) -> EnvResult<Self> {
        let path = path.as_ref();
        let db = GitRepository::init(path, signature)?;
        let store = db.store();

        let root = RootValue::empty(store.clone())?;
        let root_hash = root.write()?;
        let commit = db.create_commit(root_hash, Vec::new(), INIT_COMMIT_MESSAGE)?;
        db.init_main_branch(commit)?;

        let state = RepoState::new(&BranchName::main(), root_hash);
        state.save(path)?;

        info!(path = %path.display(), commit = %commit.short(), "initialized repository");
        Ok(Self::wrap(name.into(), path, db, store, state))
    }

    pub fn open(path: impl AsRef<Path>, name: impl Into<String>, signature: GitSignature) -> EnvResult<Self> {
        let path = path.as_ref();
        if !GitRepository::exists(path) {
            return Err(EnvError::NotFound(path.to_path_buf()));
        }
        let db = GitRepository::open(path, signature)?;
        let store = db.store();
        let state = RepoState::load(path)?;
        Ok(Self::wrap(name.into(), path, db, store, state))
    }

    fn wrap(name: String, path: &Path, db: GitRepository, store: SharedStore, state: RepoState) -> Self {
        Self {
            inner: Arc::new(RepoEnvInner {
                name,
                path: path.to_path_buf(),
                db,
                store,
                state: RwLock::new(state),
            }),
        }
    }

    /// database name used for session variables
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn db(&self) -> &GitRepository {
        &self.inner.db
    }

    pub fn store(&self) -> SharedStore {
        self.inner.store.clone()
    }

    /// snapshot of the current pointers
    pub fn repo_state(&self) -> RepoState {
        self.inner.state.read().clone()
    }

    pub fn head_branch(&self) -> EnvResult<BranchName> {
        self.inner.state.read().head_branch()
    }

    // ==================== Roots ====================

    pub fn working_hash(&self) -> Hash {
        self.inner.state.read().working
    }

    pub fn staged_hash(&self) -> Hash {
        self.inner.state.read().staged
    }

    pub fn head_commit(&self) -> EnvResult<Commit> {
        let branch = self.head_branch()?;
        Ok(self.inner.db.resolve(&CommitSpec::head(), &branch)?)
    }

    pub fn head_root(&self) -> EnvResult<RootValue> {
        let commit = self.head_commit()?;
        self.read_root(commit.root, RootKind::Head)
    }

    pub fn staged_root(&self) -> EnvResult<RootValue> {
        self.read_root(self.staged_hash(), RootKind::Staged)
    }

    pub fn working_root(&self) -> EnvResult<RootValue> {
        self.read_root(self.working_hash(), RootKind::Working)
    }

    /// Load the root value stored at `hash`.
    pub fn read_root(&self, hash: Hash, kind: RootKind) -> EnvResult<RootValue> {
        RootValue::load(self.store(), &hash).map_err(|source| EnvError::RootUnreadable {
            kind,
            hash: hash.to_hex(),
            source,
        })
    }

    /// store a root value and return its hash
    pub fn write_root(&self, root: &RootValue) -> EnvResult<Hash> {
        Ok(root.write()?)
    }

    /// Resolve a commit spec against this repository's current branch.
    pub fn resolve_commit(&self, spec: &CommitSpec) -> EnvResult<Commit> {
        let branch = self.head_branch()?;
        Ok(self.inner.db.resolve(spec, &branch)?)
    }

    // ==================== Pointer updates ====================

    /// Write both roots to the store, then replace the state file.
    pub fn update_roots(&self, working: &RootValue, staged: &RootValue) -> EnvResult<()> {
        let working = self.write_root(working)?;
        let staged = self.write_root(staged)?;
        self.update_state(|state| {
            state.working = working;
            state.staged = staged;
        })
    }

    pub fn update_staged_root(&self, staged: &RootValue) -> EnvResult<Hash> {
        let hash = self.write_root(staged)?;
        self.update_state(|state| state.staged = hash)?;
        Ok(hash)
    }

    pub fn update_working_root(&self, working: &RootValue) -> EnvResult<Hash> {
        let hash = self.write_root(working)?;
        self.set_working_hash(hash)?;
        Ok(hash)
    }

    /// point Working at an already stored root
    pub fn set_working_hash(&self, hash: Hash) -> EnvResult<()> {
        self.update_state(|state| state.working = hash)
    }

    /// point Working and Staged at already stored roots
    pub fn set_root_hashes(&self, working: Hash, staged: Hash) -> EnvResult<()> {
        self.update_state(|state| {
            state.working = working;
            state.staged = staged;
        })
    }

    /// Persist a state change. The in-memory state only changes if the file
    /// was written.
    fn update_state<F>(&self, f: F) -> EnvResult<()>
    where
        F: FnOnce(&mut RepoState),
    {
        let mut guard = self.inner.state.write();
        let mut next = guard.clone();
        f(&mut next);
        next.save(&self.inner.path)?;
        debug!(working = %next.working.short(), staged = %next.staged.short(), "repository state saved");
        *guard = next;
        Ok(())
    }

    // ==================== History ====================

    /// Commit the staged root on the current branch.
    pub fn commit_staged(&self, message: &str) -> EnvResult<CommitId> {
        let branch = self.head_branch()?;
        let parent = self.head_commit()?;
        let staged = self.staged_hash();

        let commit = self.inner.db.create_commit(staged, vec![parent.id], message)?;
        self.inner.db.set_head_to_commit(&branch, commit)?;

        info!(branch = %branch, commit = %commit.short(), "committed staged root");
        Ok(commit)
    }

    /// commits on the current branch, newest first
    pub fn log(&self, limit: Option<usize>) -> EnvResult<Vec<Commit>> {
        let head = self.head_commit()?;
        Ok(self.inner.db.history(head.id, limit)?)
    }
}

impl std::fmt::Debug for RepoEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoEnv")
            .field("name", &self.inner.name)
            .field("path", &self.inner.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root::{Table, TableSchema};
    use crate::storage::TableName;
    use tempfile::TempDir;

    fn setup() -> (TempDir, RepoEnv) {
        let dir = TempDir::new().unwrap();
        let env = RepoEnv::init(dir.path(), "test", GitSignature::verdb()).unwrap();
        (dir, env)
    }

    fn with_table(env: &RepoEnv, root: &RootValue, name: &str) -> RootValue {
        let schema = TableSchema::new(["id"]).unwrap();
        let table = Table::empty(env.store(), &schema).unwrap();
        root.put_table(&TableName::new(name).unwrap(), &table).unwrap()
    }

    #[test]
    fn test_init_roots_agree() {
        let (_dir, env) = setup();

        let head = env.head_root().unwrap();
        assert_eq!(env.working_hash(), head.hash_of());
        assert_eq!(env.staged_hash(), head.hash_of());
        assert!(head.table_names().unwrap().is_empty());

        let commit = env.head_commit().unwrap();
        assert_eq!(commit.message, INIT_COMMIT_MESSAGE);
        assert!(commit.parent_ids.is_empty());
    }

    #[test]
    fn test_reopen_keeps_state() {
        let (dir, env) = setup();
        let working = with_table(&env, &env.working_root().unwrap(), "users");
        env.update_working_root(&working).unwrap();
        drop(env);

        let env = RepoEnv::open(dir.path(), "test", GitSignature::verdb()).unwrap();
        assert_eq!(env.working_hash(), working.hash_of());
        assert_ne!(env.staged_hash(), working.hash_of());
    }

    #[test]
    fn test_open_missing_repository() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            RepoEnv::open(dir.path(), "x", GitSignature::verdb()),
            Err(EnvError::NotFound(_))
        ));
    }

    #[test]
    fn test_commit_staged_advances_branch() {
        let (_dir, env) = setup();
        let staged = with_table(&env, &env.staged_root().unwrap(), "users");
        env.update_roots(&staged, &staged).unwrap();

        let commit = env.commit_staged("add users").unwrap();
        assert_eq!(env.head_commit().unwrap().id, commit);
        assert_eq!(env.head_root().unwrap(), staged);

        let log = env.log(None).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].summary(), "add users");
    }

    #[test]
    fn test_unreadable_root() {
        let (_dir, env) = setup();
        env.set_working_hash(Hash::of(b"nothing here")).unwrap();

        assert!(matches!(
            env.working_root(),
            Err(EnvError::RootUnreadable { kind: RootKind::Working, .. })
        ));
    }
}
