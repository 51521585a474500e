//! Per-connection session state.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};
use ulid::Ulid;

use crate::editor::{EditorProps, TableEditSession};
use crate::env::{RepoEnv, RootKind};
use crate::root::RootValue;
use crate::session::error::{SessionError, SessionResult};
use crate::session::variables::{head_key, working_key, SessionValue, FOREIGN_KEY_CHECKS};
use crate::storage::{Commit, CommitSpec, GitSignature, Hash};

/// A root value together with its hash.
#[derive(Debug, Clone)]
pub struct DbRoot {
    pub hash: Hash,
    pub root: RootValue,
}

impl DbRoot {
    fn new(root: RootValue) -> Self {
        Self {
            hash: root.hash_of(),
            root,
        }
    }
}

#[derive(Debug)]
struct AttachedDb {
    env: RepoEnv,
    root: DbRoot,
    editor: TableEditSession,
}

/// One connection's view of its databases.
///
/// Each attached database has a cached root and an edit session over it.
/// The `<db>_head` variable selects the commit the root was loaded from and
/// `<db>_working` reports the cached root's hash.
#[derive(Debug)]
pub struct Session {
    id: String,
    user: GitSignature,
    props: EditorProps,
    current_db: Option<String>,
    databases: HashMap<String, AttachedDb>,
    variables: BTreeMap<String, SessionValue>,
    in_transaction: bool,
}

impl Session {
    pub fn new(user: GitSignature, props: EditorProps) -> Self {
        let mut variables = BTreeMap::new();
        let checks = if props.foreign_key_checks_disabled { 0 } else { 1 };
        variables.insert(FOREIGN_KEY_CHECKS.to_string(), SessionValue::Int(checks));

        Self {
            id: Ulid::new().to_string().to_lowercase(),
            user,
            props,
            current_db: None,
            databases: HashMap::new(),
            variables,
            in_transaction: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user(&self) -> &GitSignature {
        &self.user
    }

    pub fn props(&self) -> EditorProps {
        self.props
    }

    // ==================== Databases ====================

    /// Attach a database, starting from its current branch head.
    pub fn add_db(&mut self, env: RepoEnv) -> SessionResult<()> {
        let name = env.name().to_string();
        let head = env.head_commit()?;
        let root = env.read_root(head.root, RootKind::Head)?;

        let editor = TableEditSession::with_root(root.clone(), self.props);
        self.databases.insert(
            name.clone(),
            AttachedDb {
                env,
                root: DbRoot::new(root),
                editor,
            },
        );
        self.set_head(&name, &head.id.to_hash().to_hex())?;

        debug!(session = %self.id, db = %name, head = %head.id.short(), "attached database");
        Ok(())
    }

    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn use_database(&mut self, name: &str) -> SessionResult<()> {
        if !self.databases.contains_key(name) {
            return Err(SessionError::DatabaseNotFound(name.to_string()));
        }
        self.current_db = Some(name.to_string());
        Ok(())
    }

    pub fn current_database(&self) -> Option<&str> {
        self.current_db.as_deref()
    }

    fn current(&self) -> SessionResult<String> {
        self.current_db.clone().ok_or(SessionError::NoDatabaseSelected)
    }

    fn attached(&self, db: &str) -> SessionResult<&AttachedDb> {
        self.databases
            .get(db)
            .ok_or_else(|| SessionError::DatabaseNotFound(db.to_string()))
    }

    fn attached_mut(&mut self, db: &str) -> SessionResult<&mut AttachedDb> {
        self.databases
            .get_mut(db)
            .ok_or_else(|| SessionError::DatabaseNotFound(db.to_string()))
    }

    pub fn env(&self, db: &str) -> SessionResult<&RepoEnv> {
        Ok(&self.attached(db)?.env)
    }

    /// the attached database whose `<db>_<suffix>` variable is `name`
    fn db_for_variable(&self, name: &str, key: fn(&str) -> String) -> Option<String> {
        self.databases.keys().find(|db| key(db.as_str()) == name).cloned()
    }

    // ==================== Roots ====================

    /// the cached root, without unflushed edits
    pub fn get_root(&self, db: &str) -> SessionResult<DbRoot> {
        Ok(self.attached(db)?.root.clone())
    }

    /// Replace the cached root, rebasing the editor and updating
    /// `<db>_working`.
    pub fn set_root(&mut self, db: &str, root: RootValue) -> SessionResult<()> {
        let attached = self.attached_mut(db)?;
        attached.editor.set_root(root.clone());
        attached.root = DbRoot::new(root);
        let hash = attached.root.hash;
        self.variables.insert(working_key(db), SessionValue::Text(hash.to_hex()));
        Ok(())
    }

    /// the commit named by `<db>_head`
    pub fn get_parent_commit(&self, db: &str) -> SessionResult<Commit> {
        let attached = self.attached(db)?;
        let head = self
            .variables
            .get(&head_key(db))
            .and_then(SessionValue::as_str)
            .ok_or_else(|| SessionError::DatabaseNotFound(db.to_string()))?;
        let spec = CommitSpec::parse(head)?;
        Ok(attached.env.resolve_commit(&spec)?)
    }

    pub fn editor_mut(&mut self, db: &str) -> SessionResult<&mut TableEditSession> {
        Ok(&mut self.attached_mut(db)?.editor)
    }

    /// the edit session of the selected database
    pub fn current_editor(&mut self) -> SessionResult<&mut TableEditSession> {
        let db = self.current()?;
        self.editor_mut(&db)
    }

    // ==================== Variables ====================

    pub fn get(&self, name: &str) -> Option<&SessionValue> {
        self.variables.get(&name.to_lowercase())
    }

    pub fn variables(&self) -> impl Iterator<Item = (&String, &SessionValue)> {
        self.variables.iter()
    }

    /// Set a session variable.
    ///
    /// `<db>_head` loads the named commit's root, `<db>_working` cannot be
    /// assigned and `foreign_key_checks` accepts only 0 or 1.
    pub fn set(&mut self, name: &str, value: SessionValue) -> SessionResult<()> {
        let name = name.to_lowercase();

        if let Some(db) = self.db_for_variable(&name, head_key) {
            let text = value.as_str().ok_or_else(|| SessionError::InvalidHash {
                variable: name.clone(),
                value: value.to_string(),
            })?;
            return self.set_head(&db, text);
        }
        if self.db_for_variable(&name, working_key).is_some() {
            return Err(SessionError::ReadOnlyVariable(name));
        }
        if name == FOREIGN_KEY_CHECKS {
            return self.set_foreign_key_checks(&value);
        }

        self.variables.insert(name, value);
        Ok(())
    }

    /// Move a database to the commit `hash`.
    ///
    /// Everything is resolved before anything is published, so a failure
    /// leaves the session as it was.
    fn set_head(&mut self, db: &str, hash: &str) -> SessionResult<()> {
        let variable = head_key(db);
        let hash = Hash::from_hex(hash.trim()).map_err(|_| SessionError::InvalidHash {
            variable: variable.clone(),
            value: hash.to_string(),
        })?;

        let attached = self.attached(db)?;
        let commit = attached.env.resolve_commit(&CommitSpec::parse(&hash.to_hex())?)?;
        let root = attached.env.read_root(commit.root, RootKind::Head)?;

        self.variables.insert(variable, SessionValue::Text(hash.to_hex()));
        self.set_root(db, root)?;

        info!(session = %self.id, db, head = %commit.id.short(), "session head moved");
        Ok(())
    }

    fn set_foreign_key_checks(&mut self, value: &SessionValue) -> SessionResult<()> {
        let disabled = match value.as_int() {
            Some(0) => true,
            Some(1) => false,
            _ => {
                return Err(SessionError::InvalidValue {
                    variable: FOREIGN_KEY_CHECKS.to_string(),
                    value: value.to_string(),
                })
            }
        };

        self.props.foreign_key_checks_disabled = disabled;
        for attached in self.databases.values_mut() {
            attached.editor.set_foreign_key_checks_disabled(disabled);
        }
        self.variables
            .insert(FOREIGN_KEY_CHECKS.to_string(), SessionValue::Int(if disabled { 0 } else { 1 }));
        Ok(())
    }

    // ==================== Transactions ====================

    pub fn begin_transaction(&mut self) {
        self.in_transaction = true;
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Flush the selected database's edits, store the resulting root and
    /// point the database's Working at it.
    pub fn commit_transaction(&mut self) -> SessionResult<Hash> {
        let db = self.current()?;
        let attached = self.attached_mut(&db)?;

        let root = attached.editor.flush()?;
        let hash = attached.env.write_root(&root)?;
        attached.env.set_working_hash(hash)?;

        self.set_root(&db, root)?;
        self.in_transaction = false;

        info!(session = %self.id, db = %db, working = %hash.short(), "transaction committed");
        Ok(hash)
    }

    /// Drop unflushed edits of the selected database, keeping the cached
    /// root.
    pub fn discard_edits(&mut self) -> SessionResult<()> {
        let db = self.current()?;
        let attached = self.attached_mut(&db)?;
        attached.editor.set_root(attached.root.root.clone());
        Ok(())
    }

    /// Drop unflushed edits and reload the selected database's persisted
    /// Working root.
    pub fn rollback_transaction(&mut self) -> SessionResult<()> {
        let db = self.current()?;
        let root = self.attached(&db)?.env.working_root()?;
        self.set_root(&db, root)?;
        self.in_transaction = false;

        debug!(session = %self.id, db = %db, "transaction rolled back");
        Ok(())
    }
}
