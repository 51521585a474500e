//! Repository environment error types

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::root::RootError;
use crate::storage::StorageError;

/// which of the three roots an error concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    Head,
    Staged,
    Working,
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootKind::Head => write!(f, "head"),
            RootKind::Staged => write!(f, "staged"),
            RootKind::Working => write!(f, "working"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EnvError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Root(#[from] RootError),

    /// a root pointed to by the repository state could not be read
    #[error("unable to read {kind} root {hash}: {source}")]
    RootUnreadable {
        kind: RootKind,
        hash: String,
        #[source]
        source: RootError,
    },

    /// the repository state file could not be written
    #[error("unable to update repository state at {path}: {reason}")]
    StateIo { path: PathBuf, reason: String },

    /// the repository state file is missing or malformed
    #[error("invalid repository state at {path}: {reason}")]
    InvalidState { path: PathBuf, reason: String },

    #[error("no repository at {0}")]
    NotFound(PathBuf),
}

pub type EnvResult<T> = Result<T, EnvError>;
