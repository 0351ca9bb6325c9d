//! Language front ends lowering source text into the declaration model
//!
//! Only PHP is analyzed; the front end owns the tree-sitter grammar and
//! the statement-level helpers that work on raw source text.

mod php;

pub use php::{parse_use_statement, PhpParser};
