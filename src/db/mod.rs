//! High-level database handle and interactive shell.

mod api;
mod repl;

pub use api::{Database, DatabaseConfig, DatabaseError, DatabaseResult, Status};
pub use repl::{Repl, ReplConfig};
