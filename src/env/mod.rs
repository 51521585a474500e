//! Repository environments: where a database's roots and pointers live.

mod error;
mod repo;
mod state;

pub use error::{EnvError, EnvResult, RootKind};
pub use repo::{RepoEnv, INIT_COMMIT_MESSAGE};
pub use state::{RepoState, REPO_STATE_FILE};
