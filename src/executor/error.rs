//! Query execution errors.

use thiserror::Error;

use crate::editor::EditError;
use crate::root::RowError;
use crate::session::SessionError;
use crate::sql::ParseError;
use crate::storage::InvalidNameError;

pub type ExecuteResult<T> = Result<T, ExecuteError>;

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    Row(#[from] RowError),

    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("column count doesn't match value count: expected {expected}, got {actual}")]
    ColumnCountMismatch { expected: usize, actual: usize },

    #[error("cannot update primary key column {0}")]
    PrimaryKeyUpdate(String),

    #[error("primary key column {0} is not in the column list")]
    UnknownPrimaryKey(String),

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("division by zero")]
    DivisionByZero,
}
