//! Query result types.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

#[derive(Debug)]
pub enum QueryResult {
    /// rows from SELECT and SHOW
    Select(ResultSet),
    /// rows affected by INSERT/UPDATE/DELETE
    Modified { rows_affected: usize },
    /// DDL and SET
    Success { message: String },
    /// BEGIN/COMMIT/ROLLBACK
    Transaction { message: String },
}

impl QueryResult {
    pub fn success(message: impl Into<String>) -> Self {
        QueryResult::Success { message: message.into() }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        QueryResult::Transaction { message: message.into() }
    }

    pub fn modified(rows: usize) -> Self {
        QueryResult::Modified { rows_affected: rows }
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryResult::Select(rs) => write!(f, "{}", rs),
            QueryResult::Modified { rows_affected } => writeln!(f, "{} row(s) affected", rows_affected),
            QueryResult::Success { message } | QueryResult::Transaction { message } => writeln!(f, "{}", message),
        }
    }
}

/// Rows with a fixed column order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<BTreeMap<String, Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn push(&mut self, row: BTreeMap<String, Value>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BTreeMap<String, Value>> {
        self.rows.get(index)
    }

    /// values of one column, top to bottom
    pub fn column(&self, name: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| row.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for ResultSet {
    /// tab-separated, header first
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.columns.join("\t"))?;
        for row in &self.rows {
            let cells: Vec<String> = self
                .columns
                .iter()
                .map(|c| row.get(c).map(render).unwrap_or_else(|| "NULL".to_string()))
                .collect();
            writeln!(f, "{}", cells.join("\t"))?;
        }
        Ok(())
    }
}
