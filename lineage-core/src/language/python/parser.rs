//! Python language parser using tree-sitter

use crate::error::ParseError;
use crate::language::parser::{ParsedSource, SourceParser};
use crate::language::tree_sitter_utils::{node_text, parse_with, Dialect};
use crate::language::Language;
use tree_sitter::Node;

/// Python parser using tree-sitter
#[derive(Debug, Default, Clone, Copy)]
pub struct PythonParser;

impl SourceParser for PythonParser {
    fn language(&self) -> Language {
        Language::Python
    }

    fn parse(&self, source: &str, filename: &str) -> Result<ParsedSource, ParseError> {
        parse_with(&PythonDialect, source, filename)
    }
}

struct PythonDialect;

const DECISION_KINDS: &[&str] = &[
    "if_statement",
    "elif_clause",
    "for_statement",
    "while_statement",
    "except_clause",
    "conditional_expression",
    "boolean_operator",
    "for_in_clause",
    "if_clause",
];

const PARAMETER_KINDS: &[&str] = &[
    "identifier",
    "typed_parameter",
    "default_parameter",
    "typed_default_parameter",
    "list_splat_pattern",
    "dictionary_splat_pattern",
];

impl Dialect for PythonDialect {
    fn language(&self) -> Language {
        Language::Python
    }

    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn container_name(&self, node: Node<'_>, source: &str) -> Option<String> {
        if node.kind() != "class_definition" {
            return None;
        }
        let name = node.child_by_field_name("name")?;
        Some(node_text(name, source).to_string())
    }

    fn function_parts<'t>(&self, node: Node<'t>, source: &str) -> Option<(String, Node<'t>)> {
        // Older grammars emit a separate node kind for `async def`
        if node.kind() != "function_definition" && node.kind() != "async_function_definition" {
            return None;
        }
        let name = node.child_by_field_name("name")?;
        let body = node.child_by_field_name("body")?;
        Some((node_text(name, source).to_string(), body))
    }

    fn parameter_count(&self, node: Node<'_>, source: &str) -> u32 {
        let Some(parameters) = node.child_by_field_name("parameters") else {
            return 0;
        };
        let mut cursor = parameters.walk();
        let mut count = 0;
        for (position, param) in parameters
            .named_children(&mut cursor)
            .filter(|p| PARAMETER_KINDS.contains(&p.kind()))
            .enumerate()
        {
            let receiver = position == 0
                && param.kind() == "identifier"
                && matches!(node_text(param, source), "self" | "cls");
            if !receiver {
                count += 1;
            }
        }
        count
    }

    fn callee_name(&self, node: Node<'_>, source: &str) -> Option<String> {
        if node.kind() != "call" {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        match function.kind() {
            "identifier" => Some(node_text(function, source).to_string()),
            "attribute" => function
                .child_by_field_name("attribute")
                .map(|attr| node_text(attr, source).to_string()),
            _ => None,
        }
    }

    fn is_decision_point(&self, node: Node<'_>, source: &str) -> bool {
        match node.kind() {
            "case_clause" => !is_wildcard_case(node, source),
            kind => DECISION_KINDS.contains(&kind),
        }
    }
}

/// `case _:` is the fall-through arm, like `default` in a switch
fn is_wildcard_case(node: Node<'_>, source: &str) -> bool {
    let mut cursor = node.walk();
    let patterns: Vec<Node<'_>> = node
        .named_children(&mut cursor)
        .filter(|child| child.kind() == "case_pattern")
        .collect();
    matches!(patterns.as_slice(), [only] if node_text(*only, source).trim() == "_")
}
