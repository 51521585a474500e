//! Errors raised while turning SQL text into statements.

use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// rejected by the SQL tokenizer or grammar
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("statement not supported: {0}")]
    UnsupportedStatement(String),

    #[error("expression not supported: {0}")]
    UnsupportedExpression(String),

    /// `SET` only takes literal values
    #[error("value assigned to '{0}' must be a literal")]
    NonLiteralValue(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("expected {0}")]
    MissingClause(String),

    #[error("no statement to run")]
    EmptyQuery,

    #[error("expected a single statement")]
    MultipleStatements,
}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(e: sqlparser::parser::ParserError) -> Self {
        ParseError::Syntax(e.to_string())
    }
}
