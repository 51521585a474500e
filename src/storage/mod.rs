//! storage layer for verdb
//!
//! Everything persistent goes through here: the content-addressed value
//! store and the git history of root values. Upper layers use this API and
//! never touch git2 directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     GitRepository                           │
//! │        (value store + commits + branch refs)                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │    store    │       │   commit    │       │    refs     │
//!  │ (hash→bytes)│       │  (history)  │       │ (branches)  │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//! ```

mod commit;
mod error;
mod refs;
mod repository;
mod store;
mod types;

pub use commit::{Ancestry, Commit, CommitBase, CommitSpec, ROOT_ENTRY};
pub use error::{StorageError, StorageResult};
pub use repository::GitRepository;
pub use store::{get_value, hash_value, put_value, MemoryStore, SharedStore, ValueStore};
pub use types::{
    BranchName, CommitId, GitSignature, Hash, InvalidNameError, ParseHashError, RowKey, TableName,
};
