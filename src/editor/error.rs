//! Table edit error types

use thiserror::Error;

use crate::map::MapBuildError;
use crate::root::{RootError, RowError};
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("edit session has no root")]
    NoRoot,

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("duplicate primary key '{key}' in table {table}")]
    RowAlreadyExists { table: String, key: String },

    #[error("row '{key}' not found in table {table}")]
    RowNotFound { table: String, key: String },

    #[error("cannot change the primary key of a row in table {table}")]
    PrimaryKeyChanged { table: String },

    #[error("unknown column '{column}' in table {table}")]
    UnknownColumn { table: String, column: String },

    #[error(transparent)]
    Row(#[from] RowError),

    #[error(transparent)]
    Root(#[from] RootError),

    #[error(transparent)]
    MapBuild(#[from] MapBuildError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type EditResult<T> = Result<T, EditError>;
