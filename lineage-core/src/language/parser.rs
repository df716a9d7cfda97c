//! Language-agnostic parser traits

use crate::error::{AnalysisError, ParseError};
use crate::language::{Language, SourceSpan};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Language-agnostic parser interface
///
/// Each supported language implements this trait to turn source text into
/// function definitions and call expressions.
pub trait SourceParser: Send + Sync {
    /// The language this parser handles
    fn language(&self) -> Language;

    /// Parse source code
    ///
    /// # Arguments
    ///
    /// * `source` - The source code to parse
    /// * `filename` - Repository-relative file name (used in error locations)
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` pointing at the first syntax error in the file.
    fn parse(&self, source: &str, filename: &str) -> Result<ParsedSource, ParseError>;
}

/// A function definition discovered in a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    /// Name qualified within the file (`Class.method`, `Type::method`, `outer.inner`)
    pub name: String,
    /// Bare identifier
    pub simple_name: String,
    /// Declaration text before the body, whitespace-collapsed
    pub signature: String,
    pub parameter_count: u32,
    pub decision_points: u32,
    /// Non-empty, non-comment body lines
    pub lines_of_code: u32,
    pub span: SourceSpan,
}

impl FunctionDef {
    pub fn cyclomatic_complexity(&self) -> u32 {
        self.decision_points + 1
    }
}

/// A call expression found inside a function body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallExpr {
    /// Qualified name of the enclosing function
    pub caller: String,
    /// Name as written at the call site (last path segment, or `Type::name`)
    pub callee: String,
    pub line: u32,
}

/// Result of parsing one file
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub language: Language,
    /// Functions sorted by source position
    pub functions: Vec<FunctionDef>,
    pub calls: Vec<CallExpr>,
}

/// Outcome of looking a function up by name in one file
#[derive(Debug)]
pub enum Lookup<'a> {
    Found(&'a FunctionDef),
    Ambiguous(Vec<&'a FunctionDef>),
    Missing,
}

impl ParsedSource {
    pub fn new(language: Language, mut functions: Vec<FunctionDef>, calls: Vec<CallExpr>) -> Self {
        functions.sort_by_key(|f| f.span.start);
        ParsedSource {
            language,
            functions,
            calls,
        }
    }

    /// Find a function by qualified name, falling back to a unique simple name.
    ///
    /// Repeated definitions with identical signatures collapse to the first one.
    pub fn locate(&self, name: &str) -> Lookup<'_> {
        let exact: Vec<&FunctionDef> = self.functions.iter().filter(|f| f.name == name).collect();
        let candidates = if exact.is_empty() {
            self.functions
                .iter()
                .filter(|f| f.simple_name == name)
                .collect()
        } else {
            exact
        };

        let Some(&first) = candidates.first() else {
            return Lookup::Missing;
        };
        let same_identity = candidates
            .iter()
            .all(|f| f.name == first.name && f.signature == first.signature);
        if same_identity {
            Lookup::Found(first)
        } else {
            Lookup::Ambiguous(candidates)
        }
    }

    /// Calls made from the named function
    pub fn calls_from<'a>(&'a self, caller: &'a str) -> impl Iterator<Item = &'a CallExpr> + 'a {
        self.calls.iter().filter(move |c| c.caller == caller)
    }
}

/// Parsers keyed by file extension
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<&'static str, Arc<dyn SourceParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the Python, Go, Java and Rust parsers
    pub fn with_default_parsers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::PythonParser));
        registry.register(Arc::new(super::GoParser));
        registry.register(Arc::new(super::JavaParser));
        registry.register(Arc::new(super::RustParser));
        registry
    }

    /// Register a parser for every extension of its language
    pub fn register(&mut self, parser: Arc<dyn SourceParser>) {
        for ext in parser.language().extensions() {
            self.parsers.insert(ext, Arc::clone(&parser));
        }
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.lookup(path).is_some()
    }

    /// Parser for a file path
    ///
    /// # Errors
    ///
    /// `AnalysisError::UnsupportedLanguage` when no parser handles the extension.
    pub fn for_path(&self, path: &Path) -> Result<Arc<dyn SourceParser>, AnalysisError> {
        self.lookup(path)
            .ok_or_else(|| AnalysisError::UnsupportedLanguage {
                path: path.to_string_lossy().replace('\\', "/"),
            })
    }

    fn lookup(&self, path: &Path) -> Option<Arc<dyn SourceParser>> {
        let ext = path.extension()?.to_str()?;
        self.parsers.get(ext).cloned()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<&&str> = self.parsers.keys().collect();
        extensions.sort();
        f.debug_struct("ParserRegistry")
            .field("extensions", &extensions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, simple: &str, signature: &str, start: usize) -> FunctionDef {
        FunctionDef {
            name: name.to_string(),
            simple_name: simple.to_string(),
            signature: signature.to_string(),
            parameter_count: 0,
            decision_points: 0,
            lines_of_code: 1,
            span: SourceSpan::new(start, start + 10, 1, 1, 0),
        }
    }

    // Test implementation of SourceParser
    struct TestParser {
        function_count: usize,
    }

    impl SourceParser for TestParser {
        fn language(&self) -> Language {
            Language::Python
        }

        fn parse(&self, _source: &str, _filename: &str) -> Result<ParsedSource, ParseError> {
            let functions = (0..self.function_count)
                .rev()
                .map(|i| {
                    let name = format!("test_fn_{}", i);
                    def(&name, &name, "def f()", i * 10)
                })
                .collect();
            Ok(ParsedSource::new(Language::Python, functions, vec![]))
        }
    }

    #[test]
    fn test_parser_trait_sorts_by_position() {
        let parser = TestParser { function_count: 3 };
        let parsed = parser.parse("test source", "test.py").unwrap();

        assert_eq!(parsed.functions.len(), 3);
        assert_eq!(parsed.functions[0].name, "test_fn_0");
        assert_eq!(parsed.functions[2].name, "test_fn_2");
    }

    #[test]
    fn test_locate_prefers_qualified_name() {
        let parsed = ParsedSource::new(
            Language::Python,
            vec![
                def("run", "run", "def run()", 0),
                def("Worker.run", "run", "def run(self)", 20),
            ],
            vec![],
        );
        match parsed.locate("Worker.run") {
            Lookup::Found(f) => assert_eq!(f.name, "Worker.run"),
            other => panic!("unexpected lookup: {other:?}"),
        }
        match parsed.locate("run") {
            Lookup::Found(f) => assert_eq!(f.name, "run"),
            other => panic!("unexpected lookup: {other:?}"),
        }
    }

    #[test]
    fn test_locate_simple_name_ambiguity() {
        let parsed = ParsedSource::new(
            Language::Python,
            vec![
                def("A.run", "run", "def run(self)", 0),
                def("B.run", "run", "def run(self)", 20),
            ],
            vec![],
        );
        assert!(matches!(parsed.locate("run"), Lookup::Ambiguous(c) if c.len() == 2));
        assert!(matches!(parsed.locate("missing"), Lookup::Missing));
    }

    #[test]
    fn test_locate_collapses_identical_redefinitions() {
        let parsed = ParsedSource::new(
            Language::Python,
            vec![def("f", "f", "def f()", 0), def("f", "f", "def f()", 30)],
            vec![],
        );
        match parsed.locate("f") {
            Lookup::Found(f) => assert_eq!(f.span.start, 0),
            other => panic!("unexpected lookup: {other:?}"),
        }

        let conflicting = ParsedSource::new(
            Language::Python,
            vec![def("f", "f", "def f()", 0), def("f", "f", "def f(x)", 30)],
            vec![],
        );
        assert!(matches!(conflicting.locate("f"), Lookup::Ambiguous(_)));
    }

    #[test]
    fn test_registry_routes_by_extension() {
        let registry = ParserRegistry::with_default_parsers();
        assert!(registry.supports(Path::new("src/app.py")));
        assert!(registry.supports(Path::new("main.go")));
        assert!(registry.supports(Path::new("Main.java")));
        assert!(registry.supports(Path::new("lib.rs")));
        assert!(!registry.supports(Path::new("legacy.cob")));

        let parser = registry.for_path(Path::new("tools/run.pyw")).unwrap();
        assert_eq!(parser.language(), Language::Python);
    }

    #[test]
    fn test_registry_unsupported_language() {
        let registry = ParserRegistry::with_default_parsers();
        let err = registry.for_path(Path::new("legacy/report.cob")).err().unwrap();
        assert!(matches!(
            err,
            AnalysisError::UnsupportedLanguage { ref path } if path == "legacy/report.cob"
        ));
    }
}
