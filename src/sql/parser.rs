//! SQL parser.
//!
//! Converts SQL text to the internal AST using sqlparser.

use sqlparser::ast as sp;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;

use super::ast::*;
use super::error::{ParseError, ParseResult};

pub struct Parser;

impl Parser {
    /// Parse a single statement. A trailing `;` is allowed.
    pub fn parse(sql: &str) -> ParseResult<Statement> {
        let sql = sql.trim().trim_end_matches(';').trim();
        if sql.is_empty() {
            return Err(ParseError::EmptyQuery);
        }

        // session and transaction commands are handled before sqlparser
        let upper = sql.to_uppercase();
        match upper.split_whitespace().collect::<Vec<_>>().as_slice() {
            ["BEGIN"] | ["BEGIN", "TRANSACTION"] | ["START", "TRANSACTION"] => return Ok(Statement::Begin),
            ["COMMIT"] => return Ok(Statement::Commit),
            ["ROLLBACK"] => return Ok(Statement::Rollback),
            ["SHOW", "TABLES"] => return Ok(Statement::ShowTables),
            ["SHOW", "VARIABLES"] | ["SHOW", "SESSION", "VARIABLES"] => return Ok(Statement::ShowVariables),
            _ => {}
        }
        if upper.starts_with("SET ") {
            return Self::parse_set(&sql[4..]);
        }

        let dialect = GenericDialect {};
        let statements = SqlParser::parse_sql(&dialect, sql)?;

        match statements.as_slice() {
            [] => Err(ParseError::EmptyQuery),
            [stmt] => Self::convert_statement(stmt),
            _ => Err(ParseError::MultipleStatements),
        }
    }

    /// Parse `;`-separated statements.
    pub fn parse_multi(sql: &str) -> ParseResult<Vec<Statement>> {
        split_statements(sql).into_iter().map(Self::parse).collect()
    }

    fn parse_set(assignment: &str) -> ParseResult<Statement> {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| ParseError::MissingClause("= value".into()))?;

        let mut name = name.trim().trim_start_matches("@@");
        if let Some(rest) = strip_prefix_ignore_case(name, "session.") {
            name = rest;
        } else if let Some(rest) = strip_prefix_ignore_case(name, "session ") {
            name = rest.trim();
        }
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ParseError::InvalidIdentifier(name.to_string()));
        }

        let dialect = GenericDialect {};
        let expr = SqlParser::new(&dialect).try_with_sql(value.trim())?.parse_expr()?;
        let value = match Self::convert_expr(&expr)? {
            Expr::Literal(lit) => lit,
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr,
            } => match *expr {
                Expr::Literal(LiteralValue::Integer(n)) => LiteralValue::Integer(-n),
                Expr::Literal(LiteralValue::Float(f)) => LiteralValue::Float(-f),
                _ => return Err(ParseError::NonLiteralValue(name.to_string())),
            },
            _ => return Err(ParseError::NonLiteralValue(name.to_string())),
        };

        Ok(Statement::Set(SetVariable {
            name: name.to_lowercase(),
            value,
        }))
    }

    fn convert_statement(stmt: &sp::Statement) -> ParseResult<Statement> {
        match stmt {
            sp::Statement::CreateTable(create) => Self::convert_create_table(create),
            sp::Statement::Drop {
                object_type,
                names,
                if_exists,
                ..
            } => Self::convert_drop(object_type, names, *if_exists),
            sp::Statement::Query(query) => Self::convert_query(query),
            sp::Statement::Insert(insert) => Self::convert_insert(insert),
            sp::Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => Self::convert_update(table, assignments, selection),
            sp::Statement::Delete(delete) => Self::convert_delete(delete),
            sp::Statement::StartTransaction { .. } => Ok(Statement::Begin),
            sp::Statement::Commit { .. } => Ok(Statement::Commit),
            sp::Statement::Rollback { .. } => Ok(Statement::Rollback),
            other => Err(ParseError::UnsupportedStatement(other.to_string())),
        }
    }

    fn convert_create_table(create: &sp::CreateTable) -> ParseResult<Statement> {
        let name = Self::extract_table_name(&create.name)?;
        let columns: Vec<String> = create.columns.iter().map(|c| c.name.value.clone()).collect();
        if columns.is_empty() {
            return Err(ParseError::MissingClause("column definitions".into()));
        }

        let mut keys = create.columns.iter().filter(|c| {
            c.options
                .iter()
                .any(|opt| matches!(opt.option, sp::ColumnOption::Unique { is_primary: true, .. }))
        });
        let primary_key = keys.next().map(|c| c.name.value.clone());
        if keys.next().is_some() {
            return Err(ParseError::UnsupportedStatement("composite primary keys".into()));
        }

        Ok(Statement::CreateTable(CreateTable {
            name,
            columns,
            primary_key,
            if_not_exists: create.if_not_exists,
        }))
    }

    fn convert_drop(object_type: &sp::ObjectType, names: &[sp::ObjectName], if_exists: bool) -> ParseResult<Statement> {
        match (object_type, names) {
            (sp::ObjectType::Table, [name]) => Ok(Statement::DropTable(DropTable {
                name: Self::extract_table_name(name)?,
                if_exists,
            })),
            (sp::ObjectType::Table, _) => Err(ParseError::UnsupportedStatement(
                "DROP of several tables".into(),
            )),
            (other, _) => Err(ParseError::UnsupportedStatement(format!("DROP {}", other))),
        }
    }

    fn convert_query(query: &sp::Query) -> ParseResult<Statement> {
        let select = match query.body.as_ref() {
            sp::SetExpr::Select(s) => s,
            other => return Err(ParseError::UnsupportedStatement(other.to_string())),
        };

        let from = match select.from.as_slice() {
            [table] => Self::extract_from_table(table)?,
            [] => return Err(ParseError::MissingClause("FROM".into())),
            _ => {
                return Err(ParseError::UnsupportedStatement(
                    "exactly one table in FROM required".into(),
                ))
            }
        };

        let columns = select
            .projection
            .iter()
            .map(Self::convert_projection)
            .collect::<ParseResult<Vec<_>>>()?;

        let where_clause = select.selection.as_ref().map(Self::convert_expr).transpose()?;
        let limit = query.limit.as_ref().and_then(Self::expr_to_usize);

        Ok(Statement::Select(Select {
            columns,
            from,
            where_clause,
            limit,
        }))
    }

    fn convert_projection(item: &sp::SelectItem) -> ParseResult<SelectColumn> {
        match item {
            sp::SelectItem::Wildcard(_) => Ok(SelectColumn::Wildcard),
            sp::SelectItem::UnnamedExpr(sp::Expr::Identifier(ident)) => Ok(SelectColumn::Column(ident.value.clone())),
            other => Err(ParseError::UnsupportedExpression(other.to_string())),
        }
    }

    fn convert_insert(insert: &sp::Insert) -> ParseResult<Statement> {
        let table = match &insert.table {
            sp::TableObject::TableName(name) => Self::extract_table_name(name)?,
            sp::TableObject::TableFunction(_) => {
                return Err(ParseError::UnsupportedStatement("table function".into()))
            }
        };

        let columns = if insert.columns.is_empty() {
            None
        } else {
            Some(insert.columns.iter().map(|c| c.value.clone()).collect())
        };

        let values = match insert.source.as_ref().map(|s| s.body.as_ref()) {
            Some(sp::SetExpr::Values(sp::Values { rows, .. })) => rows
                .iter()
                .map(|row| row.iter().map(Self::convert_expr).collect::<ParseResult<Vec<_>>>())
                .collect::<ParseResult<Vec<_>>>()?,
            _ => return Err(ParseError::UnsupportedStatement("INSERT ... SELECT".into())),
        };

        Ok(Statement::Insert(Insert { table, columns, values }))
    }

    fn convert_update(
        table: &sp::TableWithJoins,
        assignments: &[sp::Assignment],
        selection: &Option<sp::Expr>,
    ) -> ParseResult<Statement> {
        let table = Self::extract_from_table(table)?;

        let assignments = assignments
            .iter()
            .map(|a| {
                let column = match &a.target {
                    sp::AssignmentTarget::ColumnName(name) => Self::extract_table_name(name)?,
                    sp::AssignmentTarget::Tuple(_) => {
                        return Err(ParseError::UnsupportedExpression("tuple assignment".into()))
                    }
                };
                Ok(Assignment {
                    column,
                    value: Self::convert_expr(&a.value)?,
                })
            })
            .collect::<ParseResult<Vec<_>>>()?;

        let where_clause = selection.as_ref().map(Self::convert_expr).transpose()?;

        Ok(Statement::Update(Update {
            table,
            assignments,
            where_clause,
        }))
    }

    fn convert_delete(delete: &sp::Delete) -> ParseResult<Statement> {
        let tables = match &delete.from {
            sp::FromTable::WithFromKeyword(tables) | sp::FromTable::WithoutKeyword(tables) => tables,
        };
        let table = match tables.as_slice() {
            [table] => Self::extract_from_table(table)?,
            _ => {
                return Err(ParseError::UnsupportedStatement(
                    "DELETE needs exactly one table".into(),
                ))
            }
        };
        let where_clause = delete.selection.as_ref().map(Self::convert_expr).transpose()?;

        Ok(Statement::Delete(Delete { table, where_clause }))
    }

    fn convert_expr(expr: &sp::Expr) -> ParseResult<Expr> {
        match expr {
            sp::Expr::Identifier(id) => Ok(Expr::Column(id.value.clone())),

            sp::Expr::CompoundIdentifier(parts) => parts
                .last()
                .map(|p| Expr::Column(p.value.clone()))
                .ok_or_else(|| ParseError::InvalidIdentifier("empty compound identifier".into())),

            sp::Expr::Value(v) => Ok(Expr::Literal(Self::convert_value(v)?)),

            sp::Expr::BinaryOp { left, op, right } => Ok(Expr::BinaryOp {
                left: Box::new(Self::convert_expr(left)?),
                op: Self::convert_binary_op(op)?,
                right: Box::new(Self::convert_expr(right)?),
            }),

            sp::Expr::UnaryOp { op, expr } => Ok(Expr::UnaryOp {
                op: Self::convert_unary_op(op)?,
                expr: Box::new(Self::convert_expr(expr)?),
            }),

            sp::Expr::IsNull(e) => Ok(Expr::IsNull {
                expr: Box::new(Self::convert_expr(e)?),
                negated: false,
            }),

            sp::Expr::IsNotNull(e) => Ok(Expr::IsNull {
                expr: Box::new(Self::convert_expr(e)?),
                negated: true,
            }),

            sp::Expr::Nested(inner) => Ok(Expr::Nested(Box::new(Self::convert_expr(inner)?))),

            other => Err(ParseError::UnsupportedExpression(other.to_string())),
        }
    }

    fn convert_value(v: &sp::ValueWithSpan) -> ParseResult<LiteralValue> {
        match &v.value {
            sp::Value::Null => Ok(LiteralValue::Null),
            sp::Value::Boolean(b) => Ok(LiteralValue::Boolean(*b)),
            sp::Value::Number(s, _) => {
                if let Ok(i) = s.parse::<i64>() {
                    Ok(LiteralValue::Integer(i))
                } else if let Ok(f) = s.parse::<f64>() {
                    Ok(LiteralValue::Float(f))
                } else {
                    Err(ParseError::UnsupportedExpression(format!("invalid number: {}", s)))
                }
            }
            sp::Value::SingleQuotedString(s) | sp::Value::DoubleQuotedString(s) => Ok(LiteralValue::String(s.clone())),
            other => Err(ParseError::UnsupportedExpression(other.to_string())),
        }
    }

    fn convert_binary_op(op: &sp::BinaryOperator) -> ParseResult<BinaryOperator> {
        match op {
            sp::BinaryOperator::Eq => Ok(BinaryOperator::Eq),
            sp::BinaryOperator::NotEq => Ok(BinaryOperator::NotEq),
            sp::BinaryOperator::Lt => Ok(BinaryOperator::Lt),
            sp::BinaryOperator::LtEq => Ok(BinaryOperator::LtEq),
            sp::BinaryOperator::Gt => Ok(BinaryOperator::Gt),
            sp::BinaryOperator::GtEq => Ok(BinaryOperator::GtEq),
            sp::BinaryOperator::And => Ok(BinaryOperator::And),
            sp::BinaryOperator::Or => Ok(BinaryOperator::Or),
            sp::BinaryOperator::Plus => Ok(BinaryOperator::Plus),
            sp::BinaryOperator::Minus => Ok(BinaryOperator::Minus),
            sp::BinaryOperator::Multiply => Ok(BinaryOperator::Multiply),
            sp::BinaryOperator::Divide => Ok(BinaryOperator::Divide),
            sp::BinaryOperator::Modulo => Ok(BinaryOperator::Modulo),
            other => Err(ParseError::UnsupportedExpression(format!("operator {}", other))),
        }
    }

    fn convert_unary_op(op: &sp::UnaryOperator) -> ParseResult<UnaryOperator> {
        match op {
            sp::UnaryOperator::Not => Ok(UnaryOperator::Not),
            sp::UnaryOperator::Minus => Ok(UnaryOperator::Minus),
            sp::UnaryOperator::Plus => Ok(UnaryOperator::Plus),
            other => Err(ParseError::UnsupportedExpression(format!("operator {}", other))),
        }
    }

    /// last part of a possibly qualified name
    fn extract_table_name(name: &sp::ObjectName) -> ParseResult<String> {
        name.0
            .last()
            .map(|part| part.as_ident().map(|id| id.value.clone()).unwrap_or_else(|| part.to_string()))
            .ok_or_else(|| ParseError::InvalidIdentifier("empty name".into()))
    }

    fn extract_from_table(from: &sp::TableWithJoins) -> ParseResult<String> {
        if !from.joins.is_empty() {
            return Err(ParseError::UnsupportedStatement("JOIN".into()));
        }
        match &from.relation {
            sp::TableFactor::Table { name, .. } => Self::extract_table_name(name),
            other => Err(ParseError::UnsupportedStatement(other.to_string())),
        }
    }

    fn expr_to_usize(expr: &sp::Expr) -> Option<usize> {
        match expr {
            sp::Expr::Value(v) => match &v.value {
                sp::Value::Number(s, _) => s.parse().ok(),
                _ => None,
            },
            _ => None,
        }
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

/// Split a script on `;`, ignoring semicolons inside quoted strings.
/// Empty statements are dropped.
pub fn split_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in sql.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), _) if c == q => quote = None,
            (None, ';') => {
                statements.push(&sql[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    statements.push(&sql[start..]);

    statements.into_iter().map(str::trim).filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_table() {
        let stmt = Parser::parse("CREATE TABLE users (name TEXT, id INTEGER PRIMARY KEY, age INTEGER)").unwrap();
        match stmt {
            Statement::CreateTable(ct) => {
                assert_eq!(ct.name, "users");
                assert_eq!(ct.columns, vec!["name", "id", "age"]);
                assert_eq!(ct.primary_key.as_deref(), Some("id"));
                assert!(!ct.if_not_exists);
            }
            other => panic!("expected CreateTable, got {other:?}"),
        }

        match Parser::parse("CREATE TABLE IF NOT EXISTS items (id INTEGER)").unwrap() {
            Statement::CreateTable(ct) => {
                assert!(ct.if_not_exists);
                assert!(ct.primary_key.is_none());
            }
            other => panic!("expected CreateTable, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_drop_table() {
        assert_eq!(
            Parser::parse("DROP TABLE IF EXISTS users").unwrap(),
            Statement::DropTable(DropTable {
                name: "users".into(),
                if_exists: true
            })
        );
    }

    #[test]
    fn test_parse_select() {
        match Parser::parse("SELECT id, name FROM users WHERE age > 21 LIMIT 10").unwrap() {
            Statement::Select(s) => {
                assert_eq!(s.from, "users");
                assert_eq!(
                    s.columns,
                    vec![SelectColumn::Column("id".into()), SelectColumn::Column("name".into())]
                );
                assert_eq!(s.limit, Some(10));
                match s.where_clause {
                    Some(Expr::BinaryOp { left, op, right }) => {
                        assert_eq!(*left, Expr::Column("age".into()));
                        assert_eq!(op, BinaryOperator::Gt);
                        assert_eq!(*right, Expr::Literal(LiteralValue::Integer(21)));
                    }
                    other => panic!("expected comparison, got {other:?}"),
                }
            }
            other => panic!("expected Select, got {other:?}"),
        }

        match Parser::parse("SELECT * FROM users;").unwrap() {
            Statement::Select(s) => assert_eq!(s.columns, vec![SelectColumn::Wildcard]),
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_insert_update_delete() {
        match Parser::parse("INSERT INTO users (id, name) VALUES ('1', 'Alice'), ('2', 'Bob')").unwrap() {
            Statement::Insert(i) => {
                assert_eq!(i.table, "users");
                assert_eq!(i.columns, Some(vec!["id".into(), "name".into()]));
                assert_eq!(i.values.len(), 2);
            }
            other => panic!("expected Insert, got {other:?}"),
        }

        match Parser::parse("UPDATE users SET name = 'Bob', age = age + 1 WHERE id = '1'").unwrap() {
            Statement::Update(u) => {
                assert_eq!(u.assignments.len(), 2);
                assert_eq!(u.assignments[1].column, "age");
                assert!(u.where_clause.is_some());
            }
            other => panic!("expected Update, got {other:?}"),
        }

        match Parser::parse("DELETE FROM users WHERE name IS NOT NULL").unwrap() {
            Statement::Delete(d) => {
                assert_eq!(d.table, "users");
                assert!(matches!(d.where_clause, Some(Expr::IsNull { negated: true, .. })));
            }
            other => panic!("expected Delete, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_session_commands() {
        assert_eq!(Parser::parse("BEGIN").unwrap(), Statement::Begin);
        assert_eq!(Parser::parse("start transaction").unwrap(), Statement::Begin);
        assert_eq!(Parser::parse("COMMIT;").unwrap(), Statement::Commit);
        assert_eq!(Parser::parse("ROLLBACK").unwrap(), Statement::Rollback);
        assert_eq!(Parser::parse("show tables").unwrap(), Statement::ShowTables);
        assert_eq!(Parser::parse("SHOW VARIABLES").unwrap(), Statement::ShowVariables);
    }

    #[test]
    fn test_parse_set() {
        assert_eq!(
            Parser::parse("SET foreign_key_checks = 0").unwrap(),
            Statement::Set(SetVariable {
                name: "foreign_key_checks".into(),
                value: LiteralValue::Integer(0),
            })
        );
        assert_eq!(
            Parser::parse("set @@SESSION.Shop_Head = 'abc'").unwrap(),
            Statement::Set(SetVariable {
                name: "shop_head".into(),
                value: LiteralValue::String("abc".into()),
            })
        );
        assert_eq!(
            Parser::parse("SET SESSION x = -5").unwrap(),
            Statement::Set(SetVariable {
                name: "x".into(),
                value: LiteralValue::Integer(-5),
            })
        );

        assert!(matches!(Parser::parse("SET x"), Err(ParseError::MissingClause(_))));
        assert!(matches!(Parser::parse("SET x = y + 1"), Err(ParseError::NonLiteralValue(_))));
        assert!(matches!(Parser::parse("SET a.b = 1"), Err(ParseError::InvalidIdentifier(_))));
    }

    #[test]
    fn test_parse_multi() {
        let statements = Parser::parse_multi("BEGIN; INSERT INTO t VALUES ('a;b'); COMMIT;").unwrap();
        assert_eq!(statements.len(), 3);
        assert!(matches!(&statements[1], Statement::Insert(i) if i.values[0][0] == Expr::Literal(LiteralValue::String("a;b".into()))));
    }

    #[test]
    fn test_empty_and_unsupported() {
        assert!(matches!(Parser::parse("   ;").unwrap_err(), ParseError::EmptyQuery));
        assert!(matches!(
            Parser::parse("SELECT * FROM a JOIN b ON a.id = b.id").unwrap_err(),
            ParseError::UnsupportedStatement(_)
        ));
    }
}
