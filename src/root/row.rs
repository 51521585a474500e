//! Rows and table schemas.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::{InvalidNameError, RowKey};

/// column values of a row, primary key column included
pub type RowData = BTreeMap<String, Value>;

/// Column layout of a table.
///
/// Rows are free-form JSON objects; the schema only fixes which column is
/// the primary key and the column order used by `SELECT *` and positional
/// `INSERT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub primary_key: String,
    pub columns: Vec<String>,
}

impl TableSchema {
    /// a schema whose first column is the primary key
    pub fn new<I, S>(columns: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let primary_key = columns.first()?.clone();
        Some(Self { primary_key, columns })
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// a row: primary key plus column values
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: RowKey,
    pub data: RowData,
}

impl Row {
    pub fn new(key: RowKey, data: RowData) -> Self {
        Self { key, data }
    }

    /// Build a row from column values, deriving the key from the schema's
    /// primary key column.
    pub fn from_data(schema: &TableSchema, data: RowData) -> Result<Self, RowError> {
        let pk = data
            .get(&schema.primary_key)
            .ok_or_else(|| RowError::MissingPrimaryKey(schema.primary_key.clone()))?;
        let key = key_from_value(pk)?;
        Ok(Self { key, data })
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.data.get(column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.data.contains_key(column)
    }

    /// merge new values into existing data (for partial updates)
    pub fn merge_data(&mut self, updates: RowData) {
        self.data.extend(updates);
    }
}

/// Convert a primary key column value to a row key.
///
/// Strings are used as-is, numbers and booleans by their JSON rendering.
pub fn key_from_value(value: &Value) -> Result<RowKey, RowError> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => return Err(RowError::NullPrimaryKey),
        other => return Err(RowError::UnsupportedKey(other.to_string())),
    };
    Ok(RowKey::new(text)?)
}

#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error("row has no value for primary key column {0}")]
    MissingPrimaryKey(String),

    #[error("primary key cannot be NULL")]
    NullPrimaryKey,

    #[error("unsupported primary key value: {0}")]
    UnsupportedKey(String),

    #[error("invalid primary key: {0}")]
    InvalidKey(#[from] InvalidNameError),
}
