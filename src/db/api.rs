//! Database API - the facade used by the command line.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::editor::EditorProps;
use crate::env::{EnvError, RepoEnv};
use crate::executor::{ExecuteError, QueryExecutor, QueryResult};
use crate::map::BuildMode;
use crate::root::TableSchema;
use crate::session::{Session, SessionError};
use crate::staging::{
    stage_all, stage_tables, table_deltas, ResetOutcome, ResetRequest, StagingError, TableDelta,
};
use crate::storage::{Commit, CommitId, GitRepository, GitSignature, TableName};

pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Execute(#[from] ExecuteError),

    #[error("database already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("database not found: {0}")]
    NotFound(PathBuf),

    #[error("nothing specified, nothing staged; use '.' to stage everything")]
    NothingToStage,
}

/// Database configuration options.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// repository directory
    pub path: PathBuf,
    /// name used for `<db>_head` / `<db>_working`; defaults to the directory name
    pub name: Option<String>,
    pub create_if_missing: bool,
    /// commit each write statement to Working when no transaction is open
    pub auto_commit: bool,
    /// author of commits
    pub signature: GitSignature,
    pub build_mode: BuildMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".verdb"),
            name: None,
            create_if_missing: true,
            auto_commit: true,
            signature: GitSignature::default(),
            build_mode: BuildMode::default(),
        }
    }
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn auto_commit(mut self, value: bool) -> Self {
        self.auto_commit = value;
        self
    }

    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = signature;
        self
    }

    pub fn build_mode(mut self, mode: BuildMode) -> Self {
        self.build_mode = mode;
        self
    }

    /// The configured name, or the last path component. Names are
    /// lowercased so they match session variable keys.
    pub fn db_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| {
                self.path
                    .file_name()
                    .map(|n| n.to_string_lossy().trim_start_matches('.').to_string())
            })
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "verdb".to_string())
            .to_lowercase()
    }
}

/// Tables that differ between the roots.
#[derive(Debug, Clone, Default)]
pub struct Status {
    /// Head vs Staged
    pub staged: Vec<TableDelta>,
    /// Staged vs Working
    pub unstaged: Vec<TableDelta>,
}

impl Status {
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty() && self.unstaged.is_empty()
    }
}

/// The main database handle.
///
/// Owns one connection for [`execute`](Self::execute); more can be opened
/// with [`connect`](Self::connect).
pub struct Database {
    config: DatabaseConfig,
    env: RepoEnv,
    conn: QueryExecutor,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> DatabaseResult<Self> {
        Self::open_with_config(DatabaseConfig::new(path.as_ref()))
    }

    pub fn open_with_config(config: DatabaseConfig) -> DatabaseResult<Self> {
        let env = if GitRepository::exists(&config.path) {
            RepoEnv::open(&config.path, config.db_name(), config.signature.clone())?
        } else if config.create_if_missing {
            RepoEnv::init(&config.path, config.db_name(), config.signature.clone())?
        } else {
            return Err(DatabaseError::NotFound(config.path.clone()));
        };
        Self::wrap(config, env)
    }

    /// Create a new repository, failing if one already exists.
    pub fn init(config: DatabaseConfig) -> DatabaseResult<Self> {
        if GitRepository::exists(&config.path) {
            return Err(DatabaseError::AlreadyExists(config.path.clone()));
        }
        let env = RepoEnv::init(&config.path, config.db_name(), config.signature.clone())?;
        Self::wrap(config, env)
    }

    fn wrap(config: DatabaseConfig, env: RepoEnv) -> DatabaseResult<Self> {
        let conn = connect(&config, &env)?;
        Ok(Self { config, env, conn })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn name(&self) -> &str {
        self.env.name()
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn env(&self) -> &RepoEnv {
        &self.env
    }

    /// Open a new connection positioned on the Working root.
    pub fn connect(&self) -> DatabaseResult<QueryExecutor> {
        connect(&self.config, &self.env)
    }

    // ==================== SQL ====================

    pub fn execute(&mut self, sql: &str) -> DatabaseResult<QueryResult> {
        debug!(sql, "execute");
        Ok(self.conn.execute(sql)?)
    }

    /// Execute `;`-separated statements, stopping at the first failure.
    pub fn execute_batch(&mut self, sql: &str) -> DatabaseResult<Vec<QueryResult>> {
        Ok(self.conn.execute_script(sql)?)
    }

    pub fn connection(&mut self) -> &mut QueryExecutor {
        &mut self.conn
    }

    /// tables of the Working root
    pub fn tables(&self) -> DatabaseResult<Vec<TableName>> {
        let working = self.env.working_root()?;
        Ok(working.table_names().map_err(EnvError::from)?)
    }

    pub fn table_schema(&self, name: &str) -> DatabaseResult<Option<TableSchema>> {
        let Ok(name) = TableName::new(name) else {
            return Ok(None);
        };
        let working = self.env.working_root()?;
        match working.get_table(&name).map_err(EnvError::from)? {
            Some(table) => Ok(Some(table.schema().map_err(EnvError::from)?)),
            None => Ok(None),
        }
    }

    // ==================== Version control ====================

    /// Stage tables and docs by name; `.` stages everything.
    pub fn stage(&mut self, names: &[String]) -> DatabaseResult<()> {
        if names.is_empty() {
            return Err(DatabaseError::NothingToStage);
        }
        if names.iter().any(|n| n == ".") {
            stage_all(&self.env)?;
        } else {
            stage_tables(&self.env, names)?;
        }
        Ok(())
    }

    /// Run a reset. A hard reset also moves this handle's connection to the
    /// new Working root.
    pub fn reset(&mut self, request: &ResetRequest) -> DatabaseResult<ResetOutcome> {
        let outcome = request.run(&self.env)?;
        if matches!(outcome, ResetOutcome::Hard(_)) {
            self.sync_connection()?;
        }
        Ok(outcome)
    }

    pub fn commit(&mut self, message: &str) -> DatabaseResult<CommitId> {
        Ok(self.env.commit_staged(message)?)
    }

    pub fn log(&self, limit: Option<usize>) -> DatabaseResult<Vec<Commit>> {
        Ok(self.env.log(limit)?)
    }

    pub fn status(&self) -> DatabaseResult<Status> {
        let head = self.env.head_root()?;
        let staged = self.env.staged_root()?;
        let working = self.env.working_root()?;
        Ok(Status {
            staged: table_deltas(&head, &staged).map_err(EnvError::from)?,
            unstaged: table_deltas(&staged, &working).map_err(EnvError::from)?,
        })
    }

    fn sync_connection(&mut self) -> DatabaseResult<()> {
        let working = self.env.working_root()?;
        let name = self.env.name().to_string();
        self.conn.session_mut().set_root(&name, working)?;
        Ok(())
    }
}

/// A session attached to `env` and rebased onto its Working root, so SQL
/// continues from uncommitted work.
fn connect(config: &DatabaseConfig, env: &RepoEnv) -> DatabaseResult<QueryExecutor> {
    let props = EditorProps {
        build_mode: config.build_mode,
        ..EditorProps::default()
    };
    let mut session = Session::new(config.signature.clone(), props);
    session.add_db(env.clone())?;
    session.use_database(env.name())?;
    session.set_root(env.name(), env.working_root()?)?;

    debug!(session = %session.id(), db = env.name(), "connection opened");
    Ok(QueryExecutor::new(session).with_auto_commit(config.auto_commit))
}
