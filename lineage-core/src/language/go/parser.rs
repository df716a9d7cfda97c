//! Go language parser using tree-sitter

use crate::error::ParseError;
use crate::language::parser::{ParsedSource, SourceParser};
use crate::language::tree_sitter_utils::{is_short_circuit, node_text, parse_with, Dialect};
use crate::language::Language;
use tree_sitter::Node;

/// Go parser using tree-sitter
#[derive(Debug, Default, Clone, Copy)]
pub struct GoParser;

impl SourceParser for GoParser {
    fn language(&self) -> Language {
        Language::Go
    }

    fn parse(&self, source: &str, filename: &str) -> Result<ParsedSource, ParseError> {
        parse_with(&GoDialect, source, filename)
    }
}

struct GoDialect;

const DECISION_KINDS: &[&str] = &[
    "if_statement",
    "for_statement",
    "expression_case",
    "type_case",
    "communication_case",
];

impl Dialect for GoDialect {
    fn language(&self) -> Language {
        Language::Go
    }

    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_go::LANGUAGE.into()
    }

    fn container_name(&self, _node: Node<'_>, _source: &str) -> Option<String> {
        None
    }

    fn function_parts<'t>(&self, node: Node<'t>, source: &str) -> Option<(String, Node<'t>)> {
        if node.kind() != "function_declaration" && node.kind() != "method_declaration" {
            return None;
        }
        let name = node.child_by_field_name("name")?;
        // Declarations without a body are implemented elsewhere (assembly, linkname)
        let body = node.child_by_field_name("body")?;
        Some((node_text(name, source).to_string(), body))
    }

    fn receiver(&self, node: Node<'_>, source: &str) -> Option<String> {
        if node.kind() != "method_declaration" {
            return None;
        }
        let receiver = node.child_by_field_name("receiver")?;
        let mut cursor = receiver.walk();
        let declaration = receiver
            .named_children(&mut cursor)
            .find(|child| child.kind() == "parameter_declaration")?;
        let type_node = declaration.child_by_field_name("type")?;
        let text = node_text(type_node, source).trim_start_matches('*');
        // Generic receivers: `List[T]` -> `List`
        let base = text.split('[').next().unwrap_or(text).trim();
        (!base.is_empty()).then(|| base.to_string())
    }

    fn parameter_count(&self, node: Node<'_>, _source: &str) -> u32 {
        let Some(parameters) = node.child_by_field_name("parameters") else {
            return 0;
        };
        let mut cursor = parameters.walk();
        let declarations: Vec<Node<'_>> = parameters.named_children(&mut cursor).collect();
        declarations
            .into_iter()
            .map(|declaration| match declaration.kind() {
                // `a, b int` declares two parameters; `int` alone declares one
                "parameter_declaration" => {
                    let mut names = declaration.walk();
                    let count = declaration
                        .children_by_field_name("name", &mut names)
                        .count() as u32;
                    count.max(1)
                }
                "variadic_parameter_declaration" => 1,
                _ => 0,
            })
            .sum()
    }

    fn callee_name(&self, node: Node<'_>, source: &str) -> Option<String> {
        if node.kind() != "call_expression" {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        match function.kind() {
            "identifier" => Some(node_text(function, source).to_string()),
            "selector_expression" => function
                .child_by_field_name("field")
                .map(|field| node_text(field, source).to_string()),
            _ => None,
        }
    }

    fn is_decision_point(&self, node: Node<'_>, source: &str) -> bool {
        DECISION_KINDS.contains(&node.kind()) || is_short_circuit(node, source)
    }
}
