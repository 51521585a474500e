//! Connection sessions: attached databases, roots, variables and
//! transaction boundaries.

mod error;
mod session;
mod variables;

pub use error::{SessionError, SessionResult};
pub use session::{DbRoot, Session};
pub use variables::{head_key, working_key, SessionValue, FOREIGN_KEY_CHECKS};
