//! Statement execution against a session.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use super::error::{ExecuteError, ExecuteResult};
use super::eval::{evaluate, matches_where, referenced_columns};
use super::result::{QueryResult, ResultSet};
use crate::editor::TableEditSession;
use crate::root::{RowData, TableSchema};
use crate::session::{Session, SessionValue};
use crate::sql::{
    CreateTable, Delete, DropTable, Expr, Insert, LiteralValue, Parser, Select, SelectColumn, SetVariable, Statement,
    Update,
};
use crate::storage::TableName;

/// Runs statements for one connection.
///
/// With auto-commit on, every successful write outside an explicit
/// transaction is committed to the database's Working root, and a failed
/// write discards its partial edits.
pub struct QueryExecutor {
    session: Session,
    auto_commit: bool,
}

impl QueryExecutor {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            auto_commit: true,
        }
    }

    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn execute(&mut self, sql: &str) -> ExecuteResult<QueryResult> {
        let stmt = Parser::parse(sql)?;
        self.execute_statement(stmt)
    }

    /// Run `;`-separated statements, stopping at the first error.
    pub fn execute_script(&mut self, sql: &str) -> ExecuteResult<Vec<QueryResult>> {
        let statements = Parser::parse_multi(sql)?;
        statements.into_iter().map(|stmt| self.execute_statement(stmt)).collect()
    }

    pub fn execute_statement(&mut self, stmt: Statement) -> ExecuteResult<QueryResult> {
        let autocommit = stmt.is_write() && self.auto_commit && !self.session.in_transaction();

        let result = match stmt {
            Statement::CreateTable(ct) => self.execute_create_table(ct),
            Statement::DropTable(dt) => self.execute_drop_table(dt),
            Statement::Select(s) => self.execute_select(s),
            Statement::Insert(i) => self.execute_insert(i),
            Statement::Update(u) => self.execute_update(u),
            Statement::Delete(d) => self.execute_delete(d),
            Statement::Begin => {
                self.session.begin_transaction();
                Ok(QueryResult::transaction("BEGIN"))
            }
            Statement::Commit => {
                let hash = self.session.commit_transaction()?;
                Ok(QueryResult::transaction(format!("COMMIT {}", hash.short())))
            }
            Statement::Rollback => {
                self.session.rollback_transaction()?;
                Ok(QueryResult::transaction("ROLLBACK"))
            }
            Statement::ShowTables => self.execute_show_tables(),
            Statement::ShowVariables => Ok(self.execute_show_variables()),
            Statement::Set(set) => self.execute_set(set),
        };

        if !autocommit {
            return result;
        }
        match result {
            Ok(result) => {
                let hash = self.session.commit_transaction()?;
                debug!(working = %hash.short(), "autocommit");
                Ok(result)
            }
            Err(e) => {
                self.session.discard_edits()?;
                Err(e)
            }
        }
    }

    fn editor(&mut self) -> ExecuteResult<&mut TableEditSession> {
        Ok(self.session.current_editor()?)
    }

    fn execute_create_table(&mut self, ct: CreateTable) -> ExecuteResult<QueryResult> {
        let name = TableName::new(&ct.name)?;
        let editor = self.editor()?;

        if ct.if_not_exists && editor.has_table(&name)? {
            return Ok(QueryResult::success(format!("Table '{}' already exists", name)));
        }

        let primary_key = match ct.primary_key {
            Some(pk) => pk,
            None => ct.columns.first().cloned().unwrap_or_default(),
        };
        if !ct.columns.contains(&primary_key) {
            return Err(ExecuteError::UnknownPrimaryKey(primary_key));
        }
        let schema = TableSchema {
            primary_key,
            columns: ct.columns,
        };

        editor.create_table(&name, &schema)?;
        Ok(QueryResult::success(format!("Created table '{}'", name)))
    }

    fn execute_drop_table(&mut self, dt: DropTable) -> ExecuteResult<QueryResult> {
        let name = TableName::new(&dt.name)?;
        let editor = self.editor()?;

        if dt.if_exists && !editor.has_table(&name)? {
            return Ok(QueryResult::success(format!("Table '{}' does not exist", name)));
        }
        editor.drop_table(&name)?;
        Ok(QueryResult::success(format!("Dropped table '{}'", name)))
    }

    fn execute_select(&mut self, select: Select) -> ExecuteResult<QueryResult> {
        let name = TableName::new(&select.from)?;
        let editor = self.editor()?;
        let schema = editor.schema(&name)?;

        if let Some(expr) = &select.where_clause {
            check_columns(&schema, expr)?;
        }

        let mut columns = Vec::new();
        for column in &select.columns {
            match column {
                SelectColumn::Wildcard => columns.extend(schema.columns.iter().cloned()),
                SelectColumn::Column(c) if schema.has_column(c) => columns.push(c.clone()),
                SelectColumn::Column(c) => return Err(ExecuteError::ColumnNotFound(c.clone())),
            }
        }

        let mut result = ResultSet::new(columns);
        for row in editor.rows(&name)? {
            if select.limit.is_some_and(|limit| result.len() >= limit) {
                break;
            }
            if let Some(expr) = &select.where_clause {
                if !matches_where(expr, &row.data)? {
                    continue;
                }
            }
            let projected: BTreeMap<String, Value> = result
                .columns
                .iter()
                .map(|c| (c.clone(), row.data.get(c).cloned().unwrap_or(Value::Null)))
                .collect();
            result.push(projected);
        }

        Ok(QueryResult::Select(result))
    }

    fn execute_insert(&mut self, insert: Insert) -> ExecuteResult<QueryResult> {
        let name = TableName::new(&insert.table)?;
        let editor = self.editor()?;
        let schema = editor.schema(&name)?;
        let columns = insert.columns.unwrap_or_else(|| schema.columns.clone());

        let empty = RowData::new();
        let mut inserted = 0;
        for values in insert.values {
            if values.len() != columns.len() {
                return Err(ExecuteError::ColumnCountMismatch {
                    expected: columns.len(),
                    actual: values.len(),
                });
            }

            let mut data = RowData::new();
            for (column, expr) in columns.iter().zip(&values) {
                data.insert(column.clone(), evaluate(expr, &empty)?);
            }
            editor.insert_row(&name, data)?;
            inserted += 1;
        }

        Ok(QueryResult::modified(inserted))
    }

    fn execute_update(&mut self, update: Update) -> ExecuteResult<QueryResult> {
        let name = TableName::new(&update.table)?;
        let editor = self.editor()?;
        let schema = editor.schema(&name)?;

        for assignment in &update.assignments {
            if assignment.column == schema.primary_key {
                return Err(ExecuteError::PrimaryKeyUpdate(assignment.column.clone()));
            }
            if !schema.has_column(&assignment.column) {
                return Err(ExecuteError::ColumnNotFound(assignment.column.clone()));
            }
            check_columns(&schema, &assignment.value)?;
        }
        if let Some(expr) = &update.where_clause {
            check_columns(&schema, expr)?;
        }

        let mut updated = 0;
        for row in editor.rows(&name)? {
            if let Some(expr) = &update.where_clause {
                if !matches_where(expr, &row.data)? {
                    continue;
                }
            }
            let mut changes = RowData::new();
            for assignment in &update.assignments {
                changes.insert(assignment.column.clone(), evaluate(&assignment.value, &row.data)?);
            }
            editor.update_row(&name, &row.key, changes)?;
            updated += 1;
        }

        Ok(QueryResult::modified(updated))
    }

    fn execute_delete(&mut self, delete: Delete) -> ExecuteResult<QueryResult> {
        let name = TableName::new(&delete.table)?;
        let editor = self.editor()?;
        let schema = editor.schema(&name)?;
        if let Some(expr) = &delete.where_clause {
            check_columns(&schema, expr)?;
        }

        let mut deleted = 0;
        for row in editor.rows(&name)? {
            if let Some(expr) = &delete.where_clause {
                if !matches_where(expr, &row.data)? {
                    continue;
                }
            }
            editor.delete_row(&name, &row.key)?;
            deleted += 1;
        }

        Ok(QueryResult::modified(deleted))
    }

    fn execute_show_tables(&mut self) -> ExecuteResult<QueryResult> {
        let mut result = ResultSet::new(vec!["Table".to_string()]);
        for name in self.editor()?.table_names()? {
            result.push(BTreeMap::from([("Table".to_string(), Value::String(name.into_string()))]));
        }
        Ok(QueryResult::Select(result))
    }

    fn execute_show_variables(&self) -> QueryResult {
        let mut result = ResultSet::new(vec!["Variable_name".to_string(), "Value".to_string()]);
        for (name, value) in self.session.variables() {
            result.push(BTreeMap::from([
                ("Variable_name".to_string(), Value::String(name.clone())),
                ("Value".to_string(), Value::String(value.to_string())),
            ]));
        }
        QueryResult::Select(result)
    }

    fn execute_set(&mut self, set: SetVariable) -> ExecuteResult<QueryResult> {
        let value = match set.value {
            LiteralValue::Null => SessionValue::Null,
            LiteralValue::Boolean(b) => SessionValue::Int(i64::from(b)),
            LiteralValue::Integer(n) => SessionValue::Int(n),
            LiteralValue::Float(f) => SessionValue::Text(f.to_string()),
            LiteralValue::String(s) => SessionValue::Text(s),
        };
        self.session.set(&set.name, value)?;
        Ok(QueryResult::success(format!("SET {}", set.name)))
    }
}

fn check_columns(schema: &TableSchema, expr: &Expr) -> ExecuteResult<()> {
    let mut columns = Vec::new();
    referenced_columns(expr, &mut columns);
    match columns.into_iter().find(|c| !schema.has_column(c)) {
        Some(missing) => Err(ExecuteError::ColumnNotFound(missing.to_string())),
        None => Ok(()),
    }
}
