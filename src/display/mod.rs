//! Human-readable renderings of expressions, and the parser that reads the
//! infix form back.
pub mod infix;
pub mod parse;
pub mod trace;

pub use infix::format_expression;
pub use parse::{parse_expression, parse_pattern, ParseError};
pub use trace::format_trace;
