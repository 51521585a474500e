//! verdb - versioned SQL tables over a content-addressed store.
//!
//! Every database has three roots: Head (the current branch's commit),
//! Staged and Working. SQL edits land in Working; staging copies tables into
//! Staged; committing snapshots Staged on the branch.
//!
//! # Example
//!
//! ```no_run
//! use verdb::db::Database;
//!
//! let mut db = Database::open("./my_database").unwrap();
//! db.execute("CREATE TABLE users (id TEXT PRIMARY KEY, name TEXT)").unwrap();
//! db.execute("INSERT INTO users (id, name) VALUES ('1', 'Alice')").unwrap();
//! db.stage(&[".".to_string()]).unwrap();
//! db.commit("add users").unwrap();
//! ```

pub mod db;
pub mod editor;
pub mod env;
pub mod executor;
pub mod logging;
pub mod map;
pub mod root;
pub mod session;
pub mod sql;
pub mod staging;
pub mod storage;
