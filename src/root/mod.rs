//! Root values, tables and rows.
//!
//! Everything here is immutable: edits return new values, and identity is the
//! content hash of the stored record.

mod docs;
mod error;
mod root_value;
mod row;
mod table;

pub use docs::{DocName, DOCS_TABLE_NAME};
pub use error::{RootError, RootResult};
pub use root_value::{union_doc_names, union_table_names, RootValue};
pub use row::{key_from_value, Row, RowData, RowError, TableSchema};
pub use table::{Conflict, ConstraintViolation, Table, ViolationKind};
