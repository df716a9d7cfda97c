//! Complexity metric assembly
//!
//! Global invariants enforced:
//! - Formatting, comments, and blank lines must not affect results
//! - Cyclomatic complexity is always >= 1

use crate::language::{CommentSyntax, FunctionDef};
use crate::model::ComplexityMetrics;

/// Count non-empty, non-comment lines
///
/// A line counts when any code remains after stripping comments. Block
/// comments may span lines; string literals are not tracked, so a comment
/// marker inside a string on a code line still leaves that line counted.
pub fn count_code_lines(text: &str, syntax: CommentSyntax) -> u32 {
    let mut in_block = false;
    let mut count = 0;

    for line in text.lines() {
        let mut rest = line.trim();
        let mut has_code = false;

        while !rest.is_empty() {
            if in_block {
                let Some((_, close)) = syntax.block else {
                    in_block = false;
                    continue;
                };
                match rest.find(close) {
                    Some(pos) => {
                        rest = rest[pos + close.len()..].trim_start();
                        in_block = false;
                    }
                    None => rest = "",
                }
                continue;
            }

            if syntax.line.iter().any(|marker| rest.starts_with(marker)) {
                break;
            }
            if let Some((open, _)) = syntax.block {
                if let Some(stripped) = rest.strip_prefix(open) {
                    rest = stripped;
                    in_block = true;
                    continue;
                }
            }

            has_code = true;
            // Only a trailing block comment can reopen a comment on a code line
            match syntax.block.and_then(|(open, _)| rest.find(open).map(|p| (p, open))) {
                Some((pos, open)) => {
                    rest = rest[pos + open.len()..].trim_start();
                    in_block = true;
                }
                None => rest = "",
            }
        }

        if has_code {
            count += 1;
        }
    }

    count
}

/// Combine parser output with history and graph figures
pub fn assemble(
    function: &FunctionDef,
    modification_frequency: usize,
    call_site_count: usize,
) -> ComplexityMetrics {
    ComplexityMetrics {
        cyclomatic_complexity: function.cyclomatic_complexity().max(1),
        lines_of_code: function.lines_of_code,
        parameter_count: function.parameter_count,
        modification_frequency: u32::try_from(modification_frequency).unwrap_or(u32::MAX),
        call_site_count: u32::try_from(call_site_count).unwrap_or(u32::MAX),
    }
}
