//! Staging and reset error types

use thiserror::Error;

use crate::env::EnvError;
use crate::root::RootError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum StagingError {
    /// names that exist in none of the roots being checked
    #[error("table(s) not found: {}", .0.join(", "))]
    TablesNotFound(Vec<String>),

    /// tables that still have unresolved conflicting rows
    #[error("table(s) have unresolved conflicts: {}", .0.join(", "))]
    TablesInConflict(Vec<String>),

    #[error("error: --hard and --soft are mutually exclusive options.")]
    MutuallyExclusive,

    #[error("--hard supports at most one additional param")]
    TooManyArguments,

    #[error("error: '{0}' cannot be reset; it is a system table")]
    DocsTableArgument(String),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Root(#[from] RootError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type StagingResult<T> = Result<T, StagingError>;
