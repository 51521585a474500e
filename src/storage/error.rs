//! Storage layer error types
//!
//! All errors that can occur while talking to the value store or the git
//! history are defined here.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::types::{Hash, InvalidNameError, ParseHashError};

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// no value is stored under the address
    #[error("value not found: {0}")]
    ValueNotFound(Hash),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// the specified branch, commit or ancestor was not found
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// a commit spec could not be parsed
    #[error("invalid commit spec: '{0}'")]
    InvalidSpec(String),

    /// invalid table, row or branch name
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    #[error(transparent)]
    InvalidHash(#[from] ParseHashError),

    /// data integrity check failed
    #[error("corrupted data at {hash}: {reason}")]
    CorruptedData { hash: Hash, reason: String },

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// repo is not initialized
    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),

    /// repo is empty (no commits)
    #[error("repository is empty: no commits found")]
    EmptyRepository,

    /// branch already exists
    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::ValueNotFound(_) | StorageError::RefNotFound(_)
        )
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
