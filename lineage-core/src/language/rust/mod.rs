//! Rust language support
//!
//! Parsed with syn rather than tree-sitter; impl methods are qualified as
//! `Type::method`.

pub mod parser;

pub use parser::RustParser;
