//! Codebase indexing for the structural stage
//!
//! Discovers source files in a [`SourceTree`] (the working tree or a committed
//! revision), parses them in parallel, resolves call sites to qualified
//! function identifiers and builds the call graph around the analysis target.
//!
//! Function identifiers are `{repo-relative path}::{qualified name}`, so the
//! same name defined in two files never collides.
//!
//! Callee resolution priority:
//! 1. Same-file definition with the exact qualified name
//! 2. Same-file definition with that simple name (unique)
//! 3. Unique definition elsewhere with the exact qualified name
//! 4. Unique definition elsewhere with that simple name
//!
//! Ambiguous and unknown names are dropped (library calls, dynamic dispatch).

use crate::callgraph::{CallEdge, CallGraph, DefinitionSite};
use crate::config::PathFilter;
use crate::error::{AnalysisError, GraphConstructionError};
use crate::git::VersionControl;
use crate::language::{FunctionDef, Lookup, ParsedSource, ParserRegistry};
use crate::model::normalize_path;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where the structural stage reads source files from
#[derive(Clone)]
pub enum SourceTree {
    /// Files on disk under the repository root
    Worktree,
    /// Files as committed at `revision`
    Revision {
        vcs: Arc<dyn VersionControl>,
        revision: String,
    },
}

impl std::fmt::Debug for SourceTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceTree::Worktree => f.write_str("Worktree"),
            SourceTree::Revision { revision, .. } => {
                f.debug_struct("Revision").field("revision", revision).finish()
            }
        }
    }
}

impl SourceTree {
    pub fn at_revision(vcs: Arc<dyn VersionControl>, revision: impl Into<String>) -> Self {
        SourceTree::Revision {
            vcs,
            revision: revision.into(),
        }
    }

    /// Contents of a repository-relative path
    pub fn read(&self, root: &Path, path: &str) -> io::Result<String> {
        match self {
            SourceTree::Worktree => std::fs::read_to_string(root.join(path)),
            SourceTree::Revision { vcs, revision } => match vcs.show_file(root, revision, path) {
                Ok(Some(content)) => Ok(content),
                Ok(None) => Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} does not exist at {}", path, revision),
                )),
                Err(e) => Err(io::Error::other(e.to_string())),
            },
        }
    }

    /// Supported, included source files as sorted repository-relative paths
    pub fn source_files(
        &self,
        root: &Path,
        parsers: &ParserRegistry,
        filter: &PathFilter,
    ) -> io::Result<Vec<String>> {
        match self {
            SourceTree::Worktree => Ok(discover_source_files(root, parsers, filter)?
                .iter()
                .map(|path| relative_path(root, path))
                .collect()),
            SourceTree::Revision { vcs, revision } => {
                let tracked = vcs
                    .list_files(root, revision)
                    .map_err(|e| io::Error::other(e.to_string()))?;
                let mut files: Vec<String> = tracked
                    .into_iter()
                    .map(|path| normalize_path(&path))
                    .filter(|path| is_indexable(path, parsers, filter))
                    .collect();
                files.sort();
                Ok(files)
            }
        }
    }
}

/// Same rules the worktree walk applies, for a path listed by the VCS
fn is_indexable(path: &str, parsers: &ParserRegistry, filter: &PathFilter) -> bool {
    let rel = Path::new(path);
    let mut dirs = path.split('/').rev().skip(1);
    !dirs.any(is_skipped_dir) && parsers.supports(rel) && filter.should_include(rel)
}

/// Result of the structural stage for one target function
#[derive(Debug, Clone)]
pub struct StructuralAnalysis {
    pub graph: CallGraph,
    /// Qualified identifier of the target (`{file}::{name}`)
    pub target_id: String,
    pub target: FunctionDef,
    pub upstream: BTreeSet<String>,
    pub downstream: BTreeSet<String>,
    pub impact_radius: BTreeSet<String>,
    /// Files or definitions skipped while indexing
    pub notes: Vec<String>,
}

impl StructuralAnalysis {
    /// In-degree of the target
    pub fn call_site_count(&self) -> usize {
        self.upstream.len()
    }
}

/// One parsed source file
struct IndexedFile {
    path: String,
    parsed: ParsedSource,
}

/// Parse the codebase in `tree` and build the call graph around `function_name`
///
/// # Errors
///
/// Fatal only for the target: unsupported extension, unreadable file,
/// syntax error, unknown function or ambiguous identity.
pub fn analyze_structure(
    root: &Path,
    tree: &SourceTree,
    file_path: &str,
    function_name: &str,
    parsers: &ParserRegistry,
    filter: &PathFilter,
) -> Result<StructuralAnalysis, AnalysisError> {
    let target_file = normalize_path(file_path);
    let target_parser = parsers.for_path(Path::new(&target_file))?;

    let target_source = tree.read(root, &target_file).map_err(|source| {
        AnalysisError::SourceUnreadable {
            path: target_file.clone(),
            source,
        }
    })?;
    let target_parsed = target_parser.parse(&target_source, &target_file)?;

    let target = match target_parsed.locate(function_name) {
        Lookup::Found(def) => def.clone(),
        Lookup::Ambiguous(candidates) => {
            let mut signatures = candidates.iter().map(|f| f.signature.clone());
            let first = signatures.next().unwrap_or_default();
            let second = signatures.find(|s| *s != first).unwrap_or_default();
            return Err(GraphConstructionError {
                name: format!("{}::{}", target_file, function_name),
                first,
                second,
            }
            .into());
        }
        Lookup::Missing => {
            return Err(AnalysisError::FunctionNotFound {
                file: target_file,
                function: function_name.to_string(),
            })
        }
    };
    let target_id = format!("{}::{}", target_file, target.name);

    let mut notes = Vec::new();
    let files = tree.source_files(root, parsers, filter).unwrap_or_else(|e| {
        warn!(root = %root.display(), ?tree, error = %e, "failed to list source files");
        notes.push(format!("repository walk incomplete: {}", e));
        Vec::new()
    });

    let results: Vec<(String, Result<ParsedSource, String>)> = files
        .par_iter()
        .filter(|rel| **rel != target_file)
        .map(|rel| (rel.clone(), parse_file(tree, root, rel, parsers)))
        .collect();

    let mut indexed = vec![IndexedFile {
        path: target_file.clone(),
        parsed: target_parsed,
    }];
    for (path, result) in results {
        match result {
            Ok(parsed) => indexed.push(IndexedFile { path, parsed }),
            Err(reason) => {
                warn!(file = %path, %reason, "skipping file");
                notes.push(format!("skipped {}: {}", path, reason));
            }
        }
    }

    let (sites, mut duplicate_notes) = definition_sites(&indexed, &target_id)?;
    notes.append(&mut duplicate_notes);

    let index = NameIndex::new(&sites);
    let calls = resolve_calls(&indexed, &index);
    let graph = CallGraph::build(&sites, &calls)?;

    debug!(
        target = %target_id,
        files = indexed.len(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "structural analysis complete"
    );

    Ok(StructuralAnalysis {
        upstream: graph.upstream(&target_id),
        downstream: graph.downstream(&target_id),
        impact_radius: graph.impact_radius(&target_id),
        graph,
        target_id,
        target,
        notes,
    })
}

fn parse_file(
    tree: &SourceTree,
    root: &Path,
    rel: &str,
    parsers: &ParserRegistry,
) -> Result<ParsedSource, String> {
    let parser = parsers.for_path(Path::new(rel)).map_err(|e| e.to_string())?;
    let source = tree.read(root, rel).map_err(|e| e.to_string())?;
    parser.parse(&source, rel).map_err(|e| e.to_string())
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    normalize_path(&rel.to_string_lossy())
}

/// Definition sites for every parsed function
///
/// Conflicting duplicates keep the first definition, unless the duplicate is
/// the target itself.
fn definition_sites(
    files: &[IndexedFile],
    target_id: &str,
) -> Result<(Vec<DefinitionSite>, Vec<String>), AnalysisError> {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut sites = Vec::new();
    let mut notes = Vec::new();

    for file in files {
        for def in &file.parsed.functions {
            let id = format!("{}::{}", file.path, def.name);
            match seen.get(&id) {
                Some(signature) if *signature == def.signature => continue,
                Some(signature) => {
                    if id == target_id {
                        return Err(GraphConstructionError {
                            name: id,
                            first: signature.clone(),
                            second: def.signature.clone(),
                        }
                        .into());
                    }
                    warn!(function = %id, "conflicting definitions; keeping the first");
                    notes.push(format!("ambiguous definition of {} ignored", id));
                    continue;
                }
                None => {}
            }
            seen.insert(id.clone(), def.signature.clone());
            sites.push(DefinitionSite {
                id,
                file: file.path.clone(),
                signature: def.signature.clone(),
            });
        }
    }

    Ok((sites, notes))
}

/// Lookup tables from names to qualified identifiers
struct NameIndex {
    /// (file, qualified name) -> id
    by_file_exact: HashMap<(String, String), String>,
    /// (file, simple name) -> ids
    by_file_simple: HashMap<(String, String), Vec<String>>,
    /// qualified name -> ids
    exact: HashMap<String, Vec<String>>,
    /// simple name -> ids
    simple: HashMap<String, Vec<String>>,
}

impl NameIndex {
    fn new(sites: &[DefinitionSite]) -> Self {
        let mut index = NameIndex {
            by_file_exact: HashMap::new(),
            by_file_simple: HashMap::new(),
            exact: HashMap::new(),
            simple: HashMap::new(),
        };

        for site in sites {
            let qualified = site
                .id
                .strip_prefix(&format!("{}::", site.file))
                .unwrap_or(&site.id)
                .to_string();
            let simple = last_segment(&qualified).to_string();

            index
                .by_file_exact
                .insert((site.file.clone(), qualified.clone()), site.id.clone());
            index
                .by_file_simple
                .entry((site.file.clone(), simple.clone()))
                .or_default()
                .push(site.id.clone());
            index
                .exact
                .entry(qualified)
                .or_default()
                .push(site.id.clone());
            index.simple.entry(simple).or_default().push(site.id.clone());
        }

        index
    }

    fn resolve(&self, file: &str, callee: &str) -> Option<String> {
        let key = (file.to_string(), callee.to_string());
        if let Some(id) = self.by_file_exact.get(&key) {
            return Some(id.clone());
        }

        let simple = last_segment(callee);
        let simple_key = (file.to_string(), simple.to_string());
        if let Some(unique) = self.by_file_simple.get(&simple_key).and_then(|ids| single(ids)) {
            return Some(unique);
        }

        if let Some(unique) = self.exact.get(callee).and_then(|ids| single(ids)) {
            return Some(unique);
        }

        self.simple.get(simple).and_then(|ids| single(ids))
    }
}

fn single(ids: &[String]) -> Option<String> {
    match ids {
        [only] => Some(only.clone()),
        _ => None,
    }
}

/// Last path segment of a qualified name (`Type::method`, `Class.method`)
fn last_segment(name: &str) -> &str {
    name.rsplit(['.', ':'])
        .find(|s| !s.is_empty())
        .unwrap_or(name)
}

fn resolve_calls(files: &[IndexedFile], index: &NameIndex) -> Vec<CallEdge> {
    let mut edges = Vec::new();
    for file in files {
        for call in &file.parsed.calls {
            if let Some(callee) = index.resolve(&file.path, &call.callee) {
                let caller = format!("{}::{}", file.path, call.caller);
                edges.push(CallEdge::new(caller, callee));
            }
        }
    }
    edges
}

/// Collect supported source files under `root` in sorted order
///
/// Hidden directories and common build or vendor directories are not
/// traversed. Symlinks are not followed.
pub fn discover_source_files(
    root: &Path,
    parsers: &ParserRegistry,
    filter: &PathFilter,
) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_source_files_recursive(root, root, parsers, filter, &mut files)?;
    files.sort();
    Ok(files)
}

/// Returns true for directory names that should not be traversed
fn is_skipped_dir(name: &str) -> bool {
    name.starts_with('.')
        || name == "node_modules"
        || name == "target"
        || name == "vendor"
        || name == "dist"
        || name == "build"
        || name == "__pycache__"
}

fn collect_source_files_recursive(
    root: &Path,
    dir: &Path,
    parsers: &ParserRegistry,
    filter: &PathFilter,
    files: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    for entry_result in std::fs::read_dir(dir)? {
        let entry = entry_result?;
        let path = entry.path();
        let metadata = std::fs::symlink_metadata(&path)?;

        if metadata.is_symlink() {
            continue;
        }

        if metadata.is_dir() {
            let skipped = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_skipped_dir);
            if !skipped {
                collect_source_files_recursive(root, &path, parsers, filter, files)?;
            }
        } else if metadata.is_file() && parsers.supports(&path) {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            if filter.should_include(rel) {
                files.push(path);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VcsError;
    use crate::git::LineRange;
    use crate::model::CommitRecord;
    use std::fs;

    /// Files committed at a single revision
    struct CommittedFiles(HashMap<String, String>);

    impl CommittedFiles {
        fn new(files: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(CommittedFiles(
                files
                    .iter()
                    .map(|(path, content)| (path.to_string(), content.to_string()))
                    .collect(),
            ))
        }
    }

    impl VersionControl for CommittedFiles {
        fn ensure_repository(&self, _: &Path) -> Result<(), VcsError> {
            Ok(())
        }

        fn resolve_revision(&self, _: &Path, rev: &str) -> Result<String, VcsError> {
            Ok(rev.to_string())
        }

        fn show_file(&self, _: &Path, _: &str, path: &str) -> Result<Option<String>, VcsError> {
            Ok(self.0.get(path).cloned())
        }

        fn list_files(&self, _: &Path, _: &str) -> Result<Vec<String>, VcsError> {
            Ok(self.0.keys().cloned().collect())
        }

        fn list_commits(
            &self,
            _: &Path,
            _: &str,
            _: &LineRange,
            _: &str,
        ) -> Result<Vec<CommitRecord>, VcsError> {
            Ok(Vec::new())
        }

        fn diff(&self, _: &Path, _: &str, _: &str, _: &LineRange) -> Result<String, VcsError> {
            Ok(String::new())
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn analyze(root: &Path, file: &str, function: &str) -> Result<StructuralAnalysis, AnalysisError> {
        analyze_structure(
            root,
            &SourceTree::Worktree,
            file,
            function,
            &ParserRegistry::with_default_parsers(),
            &PathFilter::default(),
        )
    }

    #[test]
    fn test_cross_file_calls_resolve() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "app/core.py",
            "def validate(x):\n    return x > 0\n\ndef handle(x):\n    if validate(x):\n        return store(x)\n",
        );
        write(
            dir.path(),
            "app/db.py",
            "def store(x):\n    return x\n",
        );
        write(
            dir.path(),
            "app/api.py",
            "from app.core import handle\n\ndef endpoint(req):\n    return handle(req)\n\ndef other(req):\n    return handle(req)\n",
        );

        let analysis = analyze(dir.path(), "app/core.py", "handle").unwrap();
        assert_eq!(analysis.target_id, "app/core.py::handle");
        assert_eq!(
            analysis.upstream.iter().cloned().collect::<Vec<_>>(),
            vec!["app/api.py::endpoint", "app/api.py::other"]
        );
        assert_eq!(
            analysis.downstream.iter().cloned().collect::<Vec<_>>(),
            vec!["app/core.py::validate", "app/db.py::store"]
        );
        assert_eq!(analysis.call_site_count(), 2);
        assert_eq!(analysis.impact_radius.len(), 4);
        assert!(analysis.notes.is_empty());
    }

    #[test]
    fn test_same_file_definition_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.py",
            "def helper():\n    return 1\n\ndef run():\n    return helper()\n",
        );
        write(dir.path(), "b.py", "def helper():\n    return 2\n");

        let analysis = analyze(dir.path(), "a.py", "run").unwrap();
        assert_eq!(
            analysis.downstream.iter().cloned().collect::<Vec<_>>(),
            vec!["a.py::helper"]
        );
    }

    #[test]
    fn test_ambiguous_foreign_callee_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.py", "def run():\n    return helper()\n");
        write(dir.path(), "b.py", "def helper():\n    return 2\n");
        write(dir.path(), "c.py", "def helper():\n    return 3\n");

        let analysis = analyze(dir.path(), "main.py", "run").unwrap();
        assert!(analysis.downstream.is_empty());
    }

    #[test]
    fn test_broken_neighbour_is_skipped_with_note() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ok.py", "def run():\n    return 1\n");
        write(dir.path(), "broken.py", "def oops(:\n    pass\n");

        let analysis = analyze(dir.path(), "ok.py", "run").unwrap();
        assert_eq!(analysis.notes.len(), 1);
        assert!(analysis.notes[0].contains("broken.py"));
    }

    #[test]
    fn test_target_parse_error_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.py", "def oops(:\n    pass\n");

        let err = analyze(dir.path(), "broken.py", "oops").unwrap_err();
        assert!(matches!(err, AnalysisError::Parse(_)));
    }

    #[test]
    fn test_unsupported_target_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.cob", "IDENTIFICATION DIVISION.\n");

        let err = analyze(dir.path(), "main.cob", "main").unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedLanguage { .. }));
    }

    #[test]
    fn test_missing_function_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def run():\n    return 1\n");

        let err = analyze(dir.path(), "a.py", "walk").unwrap_err();
        assert!(matches!(err, AnalysisError::FunctionNotFound { .. }));
    }

    #[test]
    fn test_conflicting_target_definitions_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.py",
            "def run(a):\n    return a\n\ndef run(a, b):\n    return b\n",
        );

        let err = analyze(dir.path(), "a.py", "run").unwrap_err();
        assert!(matches!(err, AnalysisError::GraphConstruction(_)));
    }

    #[test]
    fn test_discovery_skips_hidden_and_vendor_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main.go", "package main\n");
        write(dir.path(), "vendor/dep/dep.go", "package dep\n");
        write(dir.path(), ".cache/x.py", "x = 1\n");
        write(dir.path(), "README.md", "# readme\n");

        let files = discover_source_files(
            dir.path(),
            &ParserRegistry::with_default_parsers(),
            &PathFilter::default(),
        )
        .unwrap();
        let rel: Vec<String> = files.iter().map(|p| relative_path(dir.path(), p)).collect();
        assert_eq!(rel, vec!["src/main.go"]);
    }

    #[test]
    fn test_recursion_is_a_self_loop() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "fact.py",
            "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\n",
        );

        let analysis = analyze(dir.path(), "fact.py", "fact").unwrap();
        assert!(analysis.upstream.contains("fact.py::fact"));
        assert!(analysis.impact_radius.is_empty());
    }

    #[test]
    fn test_revision_tree_ignores_worktree_edits() {
        let dir = tempfile::tempdir().unwrap();
        // Worktree: an extra branch and no caller
        write(
            dir.path(),
            "app.py",
            "def handle(x):\n    if x:\n        return 1\n    elif x is None:\n        return 2\n    return 0\n",
        );

        let committed = CommittedFiles::new(&[
            (
                "app.py",
                "def handle(x):\n    if x:\n        return 1\n    return 0\n",
            ),
            ("api.py", "def endpoint(req):\n    return handle(req)\n"),
        ]);
        let tree = SourceTree::at_revision(committed, "abc123");
        let parsers = ParserRegistry::with_default_parsers();

        let at_commit = analyze_structure(
            dir.path(),
            &tree,
            "app.py",
            "handle",
            &parsers,
            &PathFilter::default(),
        )
        .unwrap();
        assert_eq!(at_commit.target.cyclomatic_complexity(), 2);
        assert_eq!(
            at_commit.upstream.iter().cloned().collect::<Vec<_>>(),
            vec!["api.py::endpoint"]
        );

        let worktree = analyze(dir.path(), "app.py", "handle").unwrap();
        assert_eq!(worktree.target.cyclomatic_complexity(), 3);
        assert!(worktree.upstream.is_empty());
    }

    #[test]
    fn test_revision_listing_applies_discovery_rules() {
        let committed = CommittedFiles::new(&[
            ("src/main.go", "package main\n"),
            ("vendor/dep/dep.go", "package dep\n"),
            (".cache/x.py", "x = 1\n"),
            ("README.md", "# readme\n"),
            ("lib/util.py", "x = 1\n"),
        ]);
        let tree = SourceTree::at_revision(committed, "abc123");

        let files = tree
            .source_files(
                Path::new("/unused"),
                &ParserRegistry::with_default_parsers(),
                &PathFilter::default(),
            )
            .unwrap();
        assert_eq!(files, vec!["lib/util.py", "src/main.go"]);
    }

    #[test]
    fn test_target_missing_at_revision_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "new.py", "def run():\n    return 1\n");

        let tree = SourceTree::at_revision(CommittedFiles::new(&[]), "abc123");
        let err = analyze_structure(
            dir.path(),
            &tree,
            "new.py",
            "run",
            &ParserRegistry::with_default_parsers(),
            &PathFilter::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::SourceUnreadable { .. }), "unexpected: {err}");
    }
}
