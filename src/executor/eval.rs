//! Expression evaluation over JSON rows.

use std::cmp::Ordering;

use serde_json::Value;

use super::error::{ExecuteError, ExecuteResult};
use crate::root::RowData;
use crate::sql::{BinaryOperator, Expr, UnaryOperator};

/// Evaluate an expression against a row. Columns absent from the row are
/// NULL.
pub fn evaluate(expr: &Expr, row: &RowData) -> ExecuteResult<Value> {
    match expr {
        Expr::Column(name) => Ok(row.get(name).cloned().unwrap_or(Value::Null)),

        Expr::Literal(lit) => Ok(lit.to_json()),

        Expr::BinaryOp { left, op, right } => {
            let l = evaluate(left, row)?;
            let r = evaluate(right, row)?;
            eval_binary_op(&l, *op, &r)
        }

        Expr::UnaryOp { op, expr } => {
            let v = evaluate(expr, row)?;
            eval_unary_op(*op, &v)
        }

        Expr::IsNull { expr, negated } => {
            let is_null = evaluate(expr, row)?.is_null();
            Ok(Value::Bool(is_null != *negated))
        }

        Expr::Nested(inner) => evaluate(inner, row),
    }
}

/// Evaluate a WHERE clause; NULL counts as false.
pub fn matches_where(expr: &Expr, row: &RowData) -> ExecuteResult<bool> {
    Ok(value_to_bool(&evaluate(expr, row)?))
}

/// every column name an expression reads
pub fn referenced_columns<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
    match expr {
        Expr::Column(name) => out.push(name),
        Expr::Literal(_) => {}
        Expr::BinaryOp { left, right, .. } => {
            referenced_columns(left, out);
            referenced_columns(right, out);
        }
        Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } | Expr::Nested(expr) => referenced_columns(expr, out),
    }
}

fn eval_binary_op(left: &Value, op: BinaryOperator, right: &Value) -> ExecuteResult<Value> {
    let compare = |accept: fn(Ordering) -> bool| Value::Bool(compare_values(left, right).is_some_and(accept));

    match op {
        BinaryOperator::Eq => Ok(compare(Ordering::is_eq)),
        BinaryOperator::NotEq => Ok(compare(Ordering::is_ne)),
        BinaryOperator::Lt => Ok(compare(Ordering::is_lt)),
        BinaryOperator::LtEq => Ok(compare(Ordering::is_le)),
        BinaryOperator::Gt => Ok(compare(Ordering::is_gt)),
        BinaryOperator::GtEq => Ok(compare(Ordering::is_ge)),

        BinaryOperator::And => Ok(Value::Bool(value_to_bool(left) && value_to_bool(right))),
        BinaryOperator::Or => Ok(Value::Bool(value_to_bool(left) || value_to_bool(right))),

        BinaryOperator::Plus => arithmetic(left, right, i64::checked_add, |a, b| a + b),
        BinaryOperator::Minus => arithmetic(left, right, i64::checked_sub, |a, b| a - b),
        BinaryOperator::Multiply => arithmetic(left, right, i64::checked_mul, |a, b| a * b),
        BinaryOperator::Divide | BinaryOperator::Modulo if is_zero(right) => Err(ExecuteError::DivisionByZero),
        BinaryOperator::Divide => arithmetic(left, right, |_, _| None, |a, b| a / b),
        BinaryOperator::Modulo => arithmetic(left, right, i64::checked_rem, |a, b| a % b),
    }
}

fn eval_unary_op(op: UnaryOperator, value: &Value) -> ExecuteResult<Value> {
    match op {
        UnaryOperator::Not if value.is_null() => Ok(Value::Null),
        UnaryOperator::Not => Ok(Value::Bool(!value_to_bool(value))),
        UnaryOperator::Minus => arithmetic(&Value::from(0), value, i64::checked_sub, |a, b| a - b),
        UnaryOperator::Plus => Ok(value.clone()),
    }
}

/// Integer arithmetic when both sides are integers and the result fits,
/// float arithmetic otherwise. NULL in, NULL out.
fn arithmetic(
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> ExecuteResult<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        if let Some(n) = int_op(a, b) {
            return Ok(Value::from(n));
        }
    }

    let (Some(a), Some(b)) = (to_f64(left), to_f64(right)) else {
        return Err(ExecuteError::TypeMismatch {
            expected: "number".into(),
            actual: format!("{} and {}", left, right),
        });
    };
    Ok(serde_json::Number::from_f64(float_op(a, b))
        .map(Value::Number)
        .unwrap_or(Value::Null))
}

fn is_zero(v: &Value) -> bool {
    to_f64(v) == Some(0.0)
}

fn to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Order two values of the same kind; `None` when either is NULL or the
/// kinds differ.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn value_to_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::LiteralValue;
    use serde_json::json;

    fn row() -> RowData {
        let mut data = RowData::new();
        data.insert("id".into(), json!(1));
        data.insert("name".into(), json!("Alice"));
        data.insert("age".into(), json!(30));
        data.insert("score".into(), json!(2.5));
        data.insert("active".into(), json!(true));
        data
    }

    fn col(name: &str) -> Box<Expr> {
        Box::new(Expr::Column(name.into()))
    }

    fn int(n: i64) -> Box<Expr> {
        Box::new(Expr::Literal(LiteralValue::Integer(n)))
    }

    fn binary(left: Box<Expr>, op: BinaryOperator, right: Box<Expr>) -> Expr {
        Expr::BinaryOp { left, op, right }
    }

    #[test]
    fn test_columns_and_literals() {
        assert_eq!(evaluate(&Expr::Column("name".into()), &row()).unwrap(), json!("Alice"));
        assert_eq!(evaluate(&Expr::Column("missing".into()), &row()).unwrap(), json!(null));
        assert_eq!(evaluate(&int(42), &row()).unwrap(), json!(42));
    }

    #[test]
    fn test_comparison_and_logic() {
        let older = binary(col("age"), BinaryOperator::Gt, int(25));
        assert!(matches_where(&older, &row()).unwrap());

        let both = binary(col("active"), BinaryOperator::And, Box::new(binary(col("age"), BinaryOperator::Lt, int(18))));
        assert!(!matches_where(&both, &row()).unwrap());

        // NULL never compares equal
        let null_eq = binary(col("missing"), BinaryOperator::Eq, col("missing"));
        assert!(!matches_where(&null_eq, &row()).unwrap());

        let is_null = Expr::IsNull { expr: col("missing"), negated: false };
        assert!(matches_where(&is_null, &row()).unwrap());
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(evaluate(&binary(col("age"), BinaryOperator::Plus, int(10)), &row()).unwrap(), json!(40));
        assert_eq!(evaluate(&binary(col("age"), BinaryOperator::Divide, int(4)), &row()).unwrap(), json!(7.5));
        assert_eq!(evaluate(&binary(col("score"), BinaryOperator::Multiply, int(2)), &row()).unwrap(), json!(5.0));
        assert_eq!(evaluate(&binary(col("missing"), BinaryOperator::Plus, int(1)), &row()).unwrap(), json!(null));

        assert!(matches!(
            evaluate(&binary(col("age"), BinaryOperator::Modulo, int(0)), &row()),
            Err(ExecuteError::DivisionByZero)
        ));
        assert!(matches!(
            evaluate(&binary(col("name"), BinaryOperator::Minus, int(1)), &row()),
            Err(ExecuteError::TypeMismatch { .. })
        ));

        let negated = Expr::UnaryOp { op: UnaryOperator::Minus, expr: col("age") };
        assert_eq!(evaluate(&negated, &row()).unwrap(), json!(-30));
    }

    #[test]
    fn test_referenced_columns() {
        let expr = binary(col("a"), BinaryOperator::Or, Box::new(Expr::Nested(Box::new(Expr::IsNull { expr: col("b"), negated: true }))));
        let mut cols = Vec::new();
        referenced_columns(&expr, &mut cols);
        assert_eq!(cols, vec!["a", "b"]);
    }
}
