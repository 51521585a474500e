//! Map builder error types

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum MapBuildError {
    /// a key did not strictly follow the previous one
    #[error("input was not sorted by key: {key} written after {previous}")]
    Ordering { previous: String, key: String },

    #[error("map builder already closed")]
    AlreadyClosed,

    /// the build was abandoned after an earlier failure
    #[error("map build aborted")]
    Aborted,

    #[error("map assembler panicked: {0}")]
    Panicked(String),

    #[error("failed to start map assembler: {0}")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Store(#[from] StorageError),
}

pub type MapBuildResult<T> = Result<T, MapBuildError>;
