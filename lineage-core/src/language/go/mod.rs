//! Go language support
//!
//! Function and method discovery using the tree-sitter-go grammar. Methods
//! are qualified by their receiver type (`Server.Handle`).

pub mod parser;

pub use parser::GoParser;
