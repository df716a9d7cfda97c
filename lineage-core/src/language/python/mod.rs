//! Python language support
//!
//! Function discovery, decision-point counting and call extraction using the
//! tree-sitter-python grammar.

pub mod parser;

pub use parser::PythonParser;
