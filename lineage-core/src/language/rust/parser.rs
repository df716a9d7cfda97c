//! Rust parser implementation using syn

use crate::error::ParseError;
use crate::language::parser::{CallExpr, FunctionDef, ParsedSource, SourceParser};
use crate::language::span::SourceSpan;
use crate::language::Language;
use crate::metrics::count_code_lines;
use proc_macro2::LineColumn;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::{BinOp, Block, Expr, FnArg, ImplItem, Item, ItemFn, Signature, TraitItem};

/// Rust parser using syn
#[derive(Debug, Default, Clone, Copy)]
pub struct RustParser;

impl SourceParser for RustParser {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn parse(&self, source: &str, filename: &str) -> Result<ParsedSource, ParseError> {
        let file = syn::parse_file(source).map_err(|e| {
            let start = e.span().start();
            ParseError::at(filename, start.line.max(1), start.column + 1, e.to_string())
        })?;

        let mut collector = Collector::new(source);
        for item in &file.items {
            collector.visit_item(item, &[], None);
        }

        Ok(ParsedSource::new(
            Language::Rust,
            collector.functions,
            collector.calls,
        ))
    }
}

/// Collects function definitions and their calls from a parsed file
struct Collector<'s> {
    source: &'s str,
    line_starts: Vec<usize>,
    functions: Vec<FunctionDef>,
    calls: Vec<CallExpr>,
}

impl<'s> Collector<'s> {
    fn new(source: &'s str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Collector {
            source,
            line_starts,
            functions: Vec::new(),
            calls: Vec::new(),
        }
    }

    /// Visit an item and extract functions
    ///
    /// `scope` holds enclosing module or function names, `self_type` the impl
    /// or trait type used to resolve `Self::` paths.
    fn visit_item(&mut self, item: &Item, scope: &[String], self_type: Option<&str>) {
        match item {
            Item::Fn(item_fn) => {
                self.record(&item_fn.sig, &item_fn.block, scope, self_type);
            }
            Item::Impl(item_impl) => {
                let Some(type_name) = type_name(&item_impl.self_ty) else {
                    return;
                };
                let mut inner = scope.to_vec();
                inner.push(type_name.clone());
                for impl_item in &item_impl.items {
                    if let ImplItem::Fn(method) = impl_item {
                        self.record(&method.sig, &method.block, &inner, Some(&type_name));
                    }
                }
            }
            Item::Trait(item_trait) => {
                let trait_name = item_trait.ident.to_string();
                let mut inner = scope.to_vec();
                inner.push(trait_name.clone());
                for trait_item in &item_trait.items {
                    // Only default methods carry a body
                    if let TraitItem::Fn(method) = trait_item {
                        if let Some(block) = &method.default {
                            self.record(&method.sig, block, &inner, Some(&trait_name));
                        }
                    }
                }
            }
            Item::Mod(item_mod) => {
                if let Some((_, items)) = &item_mod.content {
                    let mut inner = scope.to_vec();
                    inner.push(item_mod.ident.to_string());
                    for nested in items {
                        self.visit_item(nested, &inner, None);
                    }
                }
            }
            _ => {
                // Ignore other items (structs, enums, consts, etc.)
            }
        }
    }

    fn record(&mut self, sig: &Signature, block: &Block, scope: &[String], self_type: Option<&str>) {
        let simple_name = sig.ident.to_string();
        let name = if scope.is_empty() {
            simple_name.clone()
        } else {
            format!("{}::{}", scope.join("::"), simple_name)
        };

        let sig_start = self.byte_offset(sig.span().start());
        let block_span = block.span();
        let body_start = self.byte_offset(block_span.start());
        let body_end = self.byte_offset(block_span.end());

        let signature = self
            .source
            .get(sig_start..body_start)
            .unwrap_or("")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let body_text = self.source.get(body_start..body_end).unwrap_or("");

        let parameter_count = sig
            .inputs
            .iter()
            .filter(|arg| matches!(arg, FnArg::Typed(_)))
            .count() as u32;

        let mut body = BodyVisitor {
            self_type,
            decision_points: 0,
            callees: Vec::new(),
            nested: Vec::new(),
        };
        body.visit_block(block);

        let start = sig.span().start();
        self.functions.push(FunctionDef {
            name: name.clone(),
            simple_name,
            signature,
            parameter_count,
            decision_points: body.decision_points,
            lines_of_code: count_code_lines(body_text, Language::Rust.comment_syntax()),
            span: SourceSpan::new(
                sig_start,
                body_end,
                start.line as u32,
                block_span.end().line as u32,
                start.column as u32,
            ),
        });

        for (callee, line) in body.callees {
            self.calls.push(CallExpr {
                caller: name.clone(),
                callee,
                line: line as u32,
            });
        }

        let mut nested_scope = scope.to_vec();
        nested_scope.push(sig.ident.to_string());
        for nested in body.nested {
            self.record(&nested.sig, &nested.block, &nested_scope, self_type);
        }
    }

    /// Convert a proc-macro2 line/column (1-based line, 0-based char column) to a byte offset
    fn byte_offset(&self, position: LineColumn) -> usize {
        let Some(&line_start) = self.line_starts.get(position.line.saturating_sub(1)) else {
            return self.source.len();
        };
        let line_text = self.source[line_start..].lines().next().unwrap_or("");
        line_text
            .char_indices()
            .nth(position.column)
            .map(|(offset, _)| line_start + offset)
            .unwrap_or(line_start + line_text.len())
    }
}

fn type_name(ty: &syn::Type) -> Option<String> {
    match ty {
        syn::Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map(|seg| seg.ident.to_string()),
        syn::Type::Reference(reference) => type_name(&reference.elem),
        _ => None,
    }
}

/// Walks one function body; nested `fn` items are set aside and recorded separately
struct BodyVisitor<'ast, 't> {
    self_type: Option<&'t str>,
    decision_points: u32,
    callees: Vec<(String, usize)>,
    nested: Vec<&'ast ItemFn>,
}

impl<'ast> Visit<'ast> for BodyVisitor<'ast, '_> {
    fn visit_item(&mut self, item: &'ast Item) {
        if let Item::Fn(item_fn) = item {
            self.nested.push(item_fn);
        }
    }

    fn visit_expr_if(&mut self, node: &'ast syn::ExprIf) {
        self.decision_points += 1;
        visit::visit_expr_if(self, node);
    }

    fn visit_expr_while(&mut self, node: &'ast syn::ExprWhile) {
        self.decision_points += 1;
        visit::visit_expr_while(self, node);
    }

    fn visit_expr_for_loop(&mut self, node: &'ast syn::ExprForLoop) {
        self.decision_points += 1;
        visit::visit_expr_for_loop(self, node);
    }

    fn visit_expr_loop(&mut self, node: &'ast syn::ExprLoop) {
        self.decision_points += 1;
        visit::visit_expr_loop(self, node);
    }

    fn visit_expr_match(&mut self, node: &'ast syn::ExprMatch) {
        let arms = node.arms.len().saturating_sub(1) as u32;
        let guards = node.arms.iter().filter(|arm| arm.guard.is_some()).count() as u32;
        self.decision_points += arms + guards;
        visit::visit_expr_match(self, node);
    }

    fn visit_expr_binary(&mut self, node: &'ast syn::ExprBinary) {
        if matches!(node.op, BinOp::And(_) | BinOp::Or(_)) {
            self.decision_points += 1;
        }
        visit::visit_expr_binary(self, node);
    }

    fn visit_expr_call(&mut self, node: &'ast syn::ExprCall) {
        if let Expr::Path(path) = &*node.func {
            let segments: Vec<String> = path
                .path
                .segments
                .iter()
                .map(|seg| seg.ident.to_string())
                .collect();
            let callee = match segments.as_slice() {
                [] => None,
                [only] => Some(only.clone()),
                [.., owner, last] if owner == "Self" => Some(match self.self_type {
                    Some(ty) => format!("{}::{}", ty, last),
                    None => last.clone(),
                }),
                [.., owner, last] => Some(format!("{}::{}", owner, last)),
            };
            if let Some(callee) = callee {
                self.callees.push((callee, node.span().start().line));
            }
        }
        visit::visit_expr_call(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast syn::ExprMethodCall) {
        self.callees
            .push((node.method.to_string(), node.method.span().start().line));
        visit::visit_expr_method_call(self, node);
    }
}
