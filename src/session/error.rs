//! Session error types

use thiserror::Error;

use crate::editor::EditError;
use crate::env::EnvError;
use crate::root::RootError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no database selected")]
    NoDatabaseSelected,

    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("invalid hash '{value}' for variable '{variable}'")]
    InvalidHash { variable: String, value: String },

    #[error("variable '{variable}' can't be set to the value of '{value}'")]
    InvalidValue { variable: String, value: String },

    #[error("variable '{0}' is read-only")]
    ReadOnlyVariable(String),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    Root(#[from] RootError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type SessionResult<T> = Result<T, SessionError>;
