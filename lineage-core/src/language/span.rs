//! Language-agnostic source span representation

use serde::{Deserialize, Serialize};

/// Language-agnostic source code span
///
/// Represents a contiguous region of source code, independent of the parser used.
/// All parsers must convert their native span types to this representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    /// Byte offset of the start of the span (inclusive)
    pub start: usize,
    /// Byte offset of the end of the span (exclusive)
    pub end: usize,
    /// Line number of the start (1-indexed)
    pub start_line: u32,
    /// Line number of the end (1-indexed)
    pub end_line: u32,
    /// Column number of the start (0-indexed, in bytes)
    pub start_col: u32,
}

impl SourceSpan {
    /// Create a new source span
    pub fn new(start: usize, end: usize, start_line: u32, end_line: u32, start_col: u32) -> Self {
        SourceSpan {
            start,
            end,
            start_line,
            end_line,
            start_col,
        }
    }

    /// Build a span from a tree-sitter node
    pub fn from_node(node: tree_sitter::Node<'_>) -> Self {
        SourceSpan::new(
            node.start_byte(),
            node.end_byte(),
            node.start_position().row as u32 + 1, // tree-sitter uses 0-indexed rows
            node.end_position().row as u32 + 1,
            node.start_position().column as u32,
        )
    }

    /// Get the length of the span in bytes
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Check if the span is empty
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Number of lines covered, inclusive
    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    /// Check if this span contains another span
    pub fn contains(&self, other: &SourceSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Slice the spanned text out of `source`, if the offsets are valid
    pub fn text<'a>(&self, source: &'a str) -> Option<&'a str> {
        source.get(self.start..self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let span = SourceSpan::new(10, 20, 1, 3, 5);
        assert_eq!(span.start, 10);
        assert_eq!(span.end, 20);
        assert_eq!(span.start_line, 1);
        assert_eq!(span.end_line, 3);
        assert_eq!(span.start_col, 5);
    }

    #[test]
    fn test_len_and_empty() {
        let span = SourceSpan::new(10, 20, 1, 3, 5);
        assert_eq!(span.len(), 10);
        assert!(!span.is_empty());

        let backwards_span = SourceSpan::new(20, 10, 1, 1, 5);
        assert_eq!(backwards_span.len(), 0);
        assert!(backwards_span.is_empty());
    }

    #[test]
    fn test_line_count() {
        assert_eq!(SourceSpan::new(0, 5, 4, 4, 0).line_count(), 1);
        assert_eq!(SourceSpan::new(0, 50, 4, 9, 0).line_count(), 6);
    }

    #[test]
    fn test_contains() {
        let outer = SourceSpan::new(10, 30, 1, 5, 5);
        let inner = SourceSpan::new(15, 25, 2, 4, 10);
        let outside = SourceSpan::new(5, 15, 1, 2, 0);

        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(!outer.contains(&outside));
        assert!(outer.contains(&outer));
    }

    #[test]
    fn test_text() {
        let source = "def f():\n    pass\n";
        let span = SourceSpan::new(4, 5, 1, 1, 4);
        assert_eq!(span.text(source), Some("f"));
        assert_eq!(SourceSpan::new(4, 500, 1, 1, 4).text(source), None);
    }
}
