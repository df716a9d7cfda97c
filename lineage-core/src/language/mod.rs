//! Language detection and abstraction layer
//!
//! This module provides language-agnostic interfaces for parsing source code
//! into function definitions and call expressions across multiple languages.

pub mod go;
pub mod java;
pub mod parser;
pub mod python;
pub mod rust;
pub mod span;
pub mod tree_sitter_utils;

use std::path::Path;

pub use go::GoParser;
pub use java::JavaParser;
pub use parser::{CallExpr, FunctionDef, Lookup, ParsedSource, ParserRegistry, SourceParser};
pub use python::PythonParser;
pub use rust::RustParser;
pub use span::SourceSpan;

/// Supported programming languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// Python (.py, .pyw)
    Python,
    /// Go (.go)
    Go,
    /// Java (.java)
    Java,
    /// Rust (.rs)
    Rust,
}

/// Comment markers used when counting code lines
#[derive(Debug, Clone, Copy)]
pub struct CommentSyntax {
    pub line: &'static [&'static str],
    pub block: Option<(&'static str, &'static str)>,
}

impl Language {
    /// Detect language from file extension
    ///
    /// Returns `None` if the extension is not recognized.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineage_core::language::Language;
    ///
    /// assert_eq!(Language::from_extension("py"), Some(Language::Python));
    /// assert_eq!(Language::from_extension("go"), Some(Language::Go));
    /// assert_eq!(Language::from_extension("ts"), None);
    /// ```
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" | "pyw" => Some(Language::Python),
            "go" => Some(Language::Go),
            "java" => Some(Language::Java),
            "rs" => Some(Language::Rust),
            _ => None,
        }
    }

    /// Detect language from file path
    ///
    /// Returns `None` if the file has no extension or the extension is not recognized.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Get the canonical name of the language
    pub fn name(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::Go => "Go",
            Language::Java => "Java",
            Language::Rust => "Rust",
        }
    }

    /// Get file extensions for this language (without the dot)
    pub fn extensions(&self) -> &[&'static str] {
        match self {
            Language::Python => &["py", "pyw"],
            Language::Go => &["go"],
            Language::Java => &["java"],
            Language::Rust => &["rs"],
        }
    }

    /// Separator between a container and a member in qualified names
    pub fn member_separator(&self) -> &'static str {
        match self {
            Language::Rust => "::",
            Language::Python | Language::Go | Language::Java => ".",
        }
    }

    pub fn comment_syntax(&self) -> CommentSyntax {
        match self {
            Language::Python => CommentSyntax {
                line: &["#"],
                block: None,
            },
            Language::Go | Language::Java | Language::Rust => CommentSyntax {
                line: &["//"],
                block: Some(("/*", "*/")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(Language::from_extension("py"), Some(Language::Python));
        assert_eq!(Language::from_extension("pyw"), Some(Language::Python));
        assert_eq!(Language::from_extension("go"), Some(Language::Go));
        assert_eq!(Language::from_extension("java"), Some(Language::Java));
        assert_eq!(Language::from_extension("rs"), Some(Language::Rust));
    }

    #[test]
    fn test_from_extension_unknown() {
        assert_eq!(Language::from_extension("ts"), None);
        assert_eq!(Language::from_extension("cob"), None);
        assert_eq!(Language::from_extension(""), None);
    }

    #[test]
    fn test_from_path() {
        assert_eq!(
            Language::from_path(Path::new("src/app.py")),
            Some(Language::Python)
        );
        assert_eq!(
            Language::from_path(Path::new("cmd/main.go")),
            Some(Language::Go)
        );
        assert_eq!(
            Language::from_path(Path::new("src/Main.java")),
            Some(Language::Java)
        );
        assert_eq!(Language::from_path(Path::new("README.md")), None);
        assert_eq!(Language::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_name_and_extensions() {
        assert_eq!(Language::Python.name(), "Python");
        assert_eq!(Language::Java.name(), "Java");
        assert_eq!(Language::Python.extensions(), &["py", "pyw"]);
        assert_eq!(Language::Rust.extensions(), &["rs"]);
    }

    #[test]
    fn test_member_separator() {
        assert_eq!(Language::Rust.member_separator(), "::");
        assert_eq!(Language::Go.member_separator(), ".");
    }
}
