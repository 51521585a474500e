//! Session variable values and names.

use std::fmt;

pub const FOREIGN_KEY_CHECKS: &str = "foreign_key_checks";

const HEAD_SUFFIX: &str = "_head";
const WORKING_SUFFIX: &str = "_working";

/// name of the variable holding a database's head commit hash
pub fn head_key(db: &str) -> String {
    format!("{}{}", db.to_lowercase(), HEAD_SUFFIX)
}

/// name of the variable holding a database's working root hash
pub fn working_key(db: &str) -> String {
    format!("{}{}", db.to_lowercase(), WORKING_SUFFIX)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionValue {
    Null,
    Int(i64),
    Text(String),
}

impl SessionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SessionValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SessionValue::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<i64> for SessionValue {
    fn from(n: i64) -> Self {
        SessionValue::Int(n)
    }
}

impl From<&str> for SessionValue {
    fn from(s: &str) -> Self {
        SessionValue::Text(s.to_string())
    }
}

impl From<String> for SessionValue {
    fn from(s: String) -> Self {
        SessionValue::Text(s)
    }
}

impl fmt::Display for SessionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionValue::Null => write!(f, "NULL"),
            SessionValue::Int(n) => write!(f, "{}", n),
            SessionValue::Text(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_lowercase() {
        assert_eq!(head_key("Shop"), "shop_head");
        assert_eq!(working_key("shop"), "shop_working");
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionValue::from(1).to_string(), "1");
        assert_eq!(SessionValue::from("abc").to_string(), "abc");
        assert_eq!(SessionValue::Null.to_string(), "NULL");
        assert_eq!(SessionValue::from("x").as_int(), None);
    }
}
