//! Persistent, content-addressed ordered maps and their streaming builder.
//!
//! Tables store rows in a [`PersistentMap`] keyed by primary key; root values
//! store table and doc hashes the same way. Maps are only ever produced by a
//! [`MapBuilder`] fed strictly increasing keys.

mod builder;
mod error;
mod node;
mod persistent;

pub use builder::{BuildMode, MapBuilder};
pub use error::{MapBuildError, MapBuildResult};
pub use node::{MapKey, MapValue, NODE_FANOUT};
pub use persistent::{MapIter, MapRef, PersistentMap};
