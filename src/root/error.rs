//! Root value and table error types

use thiserror::Error;

use crate::map::MapBuildError;
use crate::storage::{InvalidNameError, StorageError};

#[derive(Debug, Error)]
pub enum RootError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    MapBuild(#[from] MapBuildError),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// the primary key is not one of the schema's columns
    #[error("primary key column {column} is not in the schema")]
    InvalidSchema { column: String },
}

pub type RootResult<T> = Result<T, RootError>;
