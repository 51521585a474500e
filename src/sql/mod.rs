//! SQL front-end.
//!
//! Statements are parsed with `sqlparser` and converted into the small AST
//! the executor runs. Session commands (`SET`, `SHOW VARIABLES`) and
//! transaction control are recognized before handing text to `sqlparser`.

mod ast;
mod error;
mod parser;

pub use ast::*;
pub use error::{ParseError, ParseResult};
pub use parser::{split_statements, Parser};
