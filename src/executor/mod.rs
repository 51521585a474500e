//! SQL statement execution over a session's edit sessions.

mod error;
mod eval;
mod executor;
mod result;

pub use error::{ExecuteError, ExecuteResult};
pub use eval::compare_values;
pub use executor::QueryExecutor;
pub use result::{QueryResult, ResultSet};
