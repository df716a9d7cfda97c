//! Shared tree-sitter walking for the Python, Go and Java parsers
//!
//! Each grammar plugs into one walker through the [`Dialect`] trait: the
//! walker tracks enclosing scopes, attributes decision points and calls to
//! the innermost function, and never lets a nested function's body leak into
//! its parent's counts.

use crate::error::ParseError;
use crate::language::parser::{CallExpr, FunctionDef, ParsedSource};
use crate::language::{Language, SourceSpan};
use crate::metrics::count_code_lines;
use tree_sitter::{Node, Parser, Tree};

/// Grammar-specific hooks for the shared walker
pub trait Dialect {
    fn language(&self) -> Language;

    fn grammar(&self) -> tree_sitter::Language;

    /// Name of a scope-introducing node (class, interface, enum...)
    fn container_name(&self, node: Node<'_>, source: &str) -> Option<String>;

    /// Simple name and body of a function definition; `None` for any other
    /// node and for bodiless declarations
    fn function_parts<'t>(&self, node: Node<'t>, source: &str) -> Option<(String, Node<'t>)>;

    /// Extra qualifier placed between the scope and the name (Go receivers)
    fn receiver(&self, _node: Node<'_>, _source: &str) -> Option<String> {
        None
    }

    fn parameter_count(&self, node: Node<'_>, source: &str) -> u32;

    /// Callee name when `node` is a call expression
    fn callee_name(&self, node: Node<'_>, source: &str) -> Option<String>;

    fn is_decision_point(&self, node: Node<'_>, source: &str) -> bool;
}

pub fn find_child_by_kind<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    let result = node
        .children(&mut cursor)
        .find(|child| child.kind() == kind);
    result
}

pub fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// True when `node` is a binary expression whose operator is `&&` or `||`
pub fn is_short_circuit(node: Node<'_>, source: &str) -> bool {
    node.kind() == "binary_expression"
        && node
            .child_by_field_name("operator")
            .map(|op| matches!(node_text(op, source), "&&" | "||"))
            .unwrap_or(false)
}

/// Parse `source` and reject trees that contain syntax errors
pub fn parse_tree(
    grammar: &tree_sitter::Language,
    source: &str,
    filename: &str,
) -> Result<Tree, ParseError> {
    let mut parser = Parser::new();
    parser
        .set_language(grammar)
        .map_err(|e| ParseError::at(filename, 1, 1, format!("grammar unavailable: {}", e)))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ParseError::at(filename, 1, 1, "parser produced no tree"))?;

    if let Some(err) = first_syntax_error(tree.root_node(), source, filename) {
        return Err(err);
    }
    Ok(tree)
}

/// Location of the first ERROR or MISSING node in document order
pub fn first_syntax_error(root: Node<'_>, source: &str, filename: &str) -> Option<ParseError> {
    if !root.has_error() {
        return None;
    }
    let position = root.start_position();
    let located = |message: String| {
        ParseError::at(filename, position.row + 1, position.column + 1, message)
    };

    if root.is_missing() {
        return Some(located(format!("missing `{}`", root.kind())));
    }
    if root.is_error() {
        let snippet: String = node_text(root, source)
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(24)
            .collect();
        return Some(located(format!("unexpected `{}`", snippet.trim())));
    }

    let mut cursor = root.walk();
    let children: Vec<Node<'_>> = root.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(|child| first_syntax_error(child, source, filename))
        .or_else(|| Some(located("syntax error".to_string())))
}

/// Parse with a dialect and extract functions and calls
pub fn parse_with<D: Dialect>(
    dialect: &D,
    source: &str,
    filename: &str,
) -> Result<ParsedSource, ParseError> {
    let tree = parse_tree(&dialect.grammar(), source, filename)?;
    Ok(extract(dialect, &tree, source))
}

pub fn extract<D: Dialect>(dialect: &D, tree: &Tree, source: &str) -> ParsedSource {
    let mut walker = Walker {
        dialect,
        source,
        separator: dialect.language().member_separator(),
        scope: Vec::new(),
        functions: Vec::new(),
        calls: Vec::new(),
    };
    walker.visit(tree.root_node(), None);
    ParsedSource::new(dialect.language(), walker.functions, walker.calls)
}

struct Walker<'a, D: Dialect> {
    dialect: &'a D,
    source: &'a str,
    separator: &'static str,
    scope: Vec<String>,
    functions: Vec<FunctionDef>,
    calls: Vec<CallExpr>,
}

impl<D: Dialect> Walker<'_, D> {
    fn visit(&mut self, node: Node<'_>, current: Option<usize>) {
        if let Some((simple_name, body)) = self.dialect.function_parts(node, self.source) {
            let index = self.push_function(node, &simple_name, body);
            self.scope.push(self.scoped_segment(node, &simple_name));
            self.visit_children(node, Some(index));
            self.scope.pop();
            return;
        }

        if let Some(container) = self.dialect.container_name(node, self.source) {
            self.scope.push(container);
            self.visit_children(node, current);
            self.scope.pop();
            return;
        }

        if let Some(index) = current {
            if self.dialect.is_decision_point(node, self.source) {
                self.functions[index].decision_points += 1;
            }
            if let Some(callee) = self.dialect.callee_name(node, self.source) {
                self.calls.push(CallExpr {
                    caller: self.functions[index].name.clone(),
                    callee,
                    line: node.start_position().row as u32 + 1,
                });
            }
        }

        self.visit_children(node, current);
    }

    fn visit_children(&mut self, node: Node<'_>, current: Option<usize>) {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        for child in children {
            self.visit(child, current);
        }
    }

    fn scoped_segment(&self, node: Node<'_>, simple_name: &str) -> String {
        match self.dialect.receiver(node, self.source) {
            Some(receiver) => format!("{}{}{}", receiver, self.separator, simple_name),
            None => simple_name.to_string(),
        }
    }

    fn push_function(&mut self, node: Node<'_>, simple_name: &str, body: Node<'_>) -> usize {
        let segment = self.scoped_segment(node, simple_name);
        let name = if self.scope.is_empty() {
            segment
        } else {
            format!("{}{}{}", self.scope.join(self.separator), self.separator, segment)
        };

        let header = self
            .source
            .get(node.start_byte()..body.start_byte())
            .unwrap_or("");
        let signature = header.split_whitespace().collect::<Vec<_>>().join(" ");
        let lines_of_code = count_code_lines(
            node_text(body, self.source),
            self.dialect.language().comment_syntax(),
        );

        self.functions.push(FunctionDef {
            name,
            simple_name: simple_name.to_string(),
            signature,
            parameter_count: self.dialect.parameter_count(node, self.source),
            decision_points: 0,
            lines_of_code,
            span: SourceSpan::from_node(node),
        });
        self.functions.len() - 1
    }
}
