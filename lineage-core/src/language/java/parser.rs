//! Java language parser using tree-sitter

use crate::error::ParseError;
use crate::language::parser::{ParsedSource, SourceParser};
use crate::language::tree_sitter_utils::{is_short_circuit, node_text, parse_with, Dialect};
use crate::language::Language;
use tree_sitter::Node;

/// Java parser using tree-sitter
#[derive(Debug, Default, Clone, Copy)]
pub struct JavaParser;

impl SourceParser for JavaParser {
    fn language(&self) -> Language {
        Language::Java
    }

    fn parse(&self, source: &str, filename: &str) -> Result<ParsedSource, ParseError> {
        parse_with(&JavaDialect, source, filename)
    }
}

struct JavaDialect;

const CONTAINER_KINDS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
];

const DECISION_KINDS: &[&str] = &[
    "if_statement",
    "for_statement",
    "enhanced_for_statement",
    "while_statement",
    "do_statement",
    "catch_clause",
    "ternary_expression",
];

impl Dialect for JavaDialect {
    fn language(&self) -> Language {
        Language::Java
    }

    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_java::LANGUAGE.into()
    }

    fn container_name(&self, node: Node<'_>, source: &str) -> Option<String> {
        if !CONTAINER_KINDS.contains(&node.kind()) {
            return None;
        }
        let name = node.child_by_field_name("name")?;
        Some(node_text(name, source).to_string())
    }

    fn function_parts<'t>(&self, node: Node<'t>, source: &str) -> Option<(String, Node<'t>)> {
        if node.kind() != "method_declaration" && node.kind() != "constructor_declaration" {
            return None;
        }
        let name = node.child_by_field_name("name")?;
        // Abstract and interface methods have no body
        let body = node.child_by_field_name("body")?;
        Some((node_text(name, source).to_string(), body))
    }

    fn parameter_count(&self, node: Node<'_>, _source: &str) -> u32 {
        let Some(parameters) = node.child_by_field_name("parameters") else {
            return 0;
        };
        let mut cursor = parameters.walk();
        let count = parameters
            .named_children(&mut cursor)
            .filter(|p| matches!(p.kind(), "formal_parameter" | "spread_parameter"))
            .count();
        count as u32
    }

    fn callee_name(&self, node: Node<'_>, source: &str) -> Option<String> {
        match node.kind() {
            "method_invocation" => node
                .child_by_field_name("name")
                .map(|name| node_text(name, source).to_string()),
            // `new Foo(..)` resolves to the `Foo` constructor
            "object_creation_expression" => node
                .child_by_field_name("type")
                .filter(|t| t.kind() == "type_identifier")
                .map(|t| node_text(t, source).to_string()),
            _ => None,
        }
    }

    fn is_decision_point(&self, node: Node<'_>, source: &str) -> bool {
        if DECISION_KINDS.contains(&node.kind()) || is_short_circuit(node, source) {
            return true;
        }
        node.kind() == "switch_label" && node_text(node, source).starts_with("case")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParsedSource {
        JavaParser.parse(source, "Test.java").unwrap()
    }

    #[test]
    fn test_parse_simple_method() {
        let parsed = parse(
            r#"
public class Simple {
    public int simpleMethod(int x) {
        return x + 1;
    }
}
"#,
        );
        assert_eq!(parsed.functions.len(), 1);
        let f = &parsed.functions[0];
        assert_eq!(f.name, "Simple.simpleMethod");
        assert_eq!(f.simple_name, "simpleMethod");
        assert_eq!(f.parameter_count, 1);
        assert_eq!(f.signature, "public int simpleMethod(int x)");
    }

    #[test]
    fn test_parse_constructor_and_creation() {
        let parsed = parse(
            r#"
public class Account {
    private int value;

    public Account(int value) {
        this.value = value;
    }

    public static Account open() {
        return new Account(0);
    }
}
"#,
        );
        let names: Vec<&str> = parsed.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Account.Account", "Account.open"]);
        let call = parsed.calls_from("Account.open").next().unwrap();
        assert_eq!(call.callee, "Account");
    }

    #[test]
    fn test_parse_inner_class_methods() {
        let parsed = parse(
            r#"
public class Outer {
    public void outerMethod() {
        return;
    }

    class Inner {
        public void innerMethod() {
            return;
        }
    }
}
"#,
        );
        let names: Vec<&str> = parsed.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Outer.outerMethod", "Outer.Inner.innerMethod"]);
    }

    #[test]
    fn test_interface_skips_abstract_methods() {
        let parsed = parse(
            r#"
public interface Shape {
    double area();

    default String describe() {
        return "area " + area();
    }
}
"#,
        );
        assert_eq!(parsed.functions.len(), 1);
        assert_eq!(parsed.functions[0].name, "Shape.describe");
        assert_eq!(parsed.calls[0].callee, "area");
    }

    #[test]
    fn test_decision_points() {
        let parsed = parse(
            r#"
class Router {
    int route(String kind, boolean ok, int[] items) {
        if (ok && kind != null) {
            return 1;
        } else if (kind.isEmpty() || !ok) {
            return 2;
        }
        for (int item : items) {
            try {
                process(item);
            } catch (IllegalStateException e) {
                return -1;
            }
        }
        switch (kind) {
            case "a":
                return 3;
            case "b":
                return 4;
            default:
                return ok ? 5 : 6;
        }
    }
}
"#,
        );
        // if, &&, else if, ||, for-each, catch, two cases, ternary
        assert_eq!(parsed.functions[0].decision_points, 9);
    }

    #[test]
    fn test_parse_empty_file() {
        assert!(parse("").functions.is_empty());
    }

    #[test]
    fn test_parse_syntax_error() {
        let source = "public class Broken {\n    public void broken(int x) {\n        return x +;\n    }\n}\n";
        let err = JavaParser.parse(source, "Broken.java").unwrap_err();
        assert!(err.location.starts_with("Broken.java:3:"), "{}", err.location);
    }
}
