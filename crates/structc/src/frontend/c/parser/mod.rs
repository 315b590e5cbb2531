//! Parser for C source code

mod parser;

pub use parser::{MAX_NESTING, Parser};
