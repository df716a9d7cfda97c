//! History collection for a single function
//!
//! Locates the function's line range at the requested revision and asks the
//! version-control reader for every commit that touched that range. When the
//! function cannot be located by parsing, git's own funcname matching is used
//! instead (best-effort across renames).

use crate::error::VcsError;
use crate::git::{LineRange, VersionControl};
use crate::language::{Lookup, ParserRegistry};
use crate::model::CommitRecord;
use regex::Regex;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// `#123`, `GH-123` and tracker keys like `ABC-123`
static ISSUE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(#\d+)\b|\b([A-Z][A-Z0-9]+-\d+)\b").expect("valid issue pattern")
});

/// Collects the commits that touched one function
#[derive(Clone)]
pub struct HistoryCollector {
    vcs: Arc<dyn VersionControl>,
    parsers: ParserRegistry,
}

impl HistoryCollector {
    pub fn new(vcs: Arc<dyn VersionControl>, parsers: ParserRegistry) -> Self {
        HistoryCollector { vcs, parsers }
    }

    /// Commits touching `function_name` in `file_path`, oldest first
    ///
    /// Each record's diff is restricted to the function's lines. An empty
    /// list means the function has no recorded history.
    ///
    /// # Errors
    ///
    /// `VcsError` when the repository cannot be read at all.
    pub fn collect(
        &self,
        repository: &Path,
        file_path: &str,
        function_name: &str,
        revision: &str,
    ) -> Result<Vec<CommitRecord>, VcsError> {
        self.vcs.ensure_repository(repository)?;

        let range = self.locate_range(repository, file_path, function_name, revision)?;
        debug!(file = file_path, function = function_name, ?range, "collecting history");

        let mut commits = self
            .vcs
            .list_commits(repository, file_path, &range, revision)?;

        for commit in &mut commits {
            if commit.diff.is_empty() {
                commit.diff = self.vcs.diff(repository, &commit.hash, file_path, &range)?;
            }
            commit.issue_ids = extract_issue_ids(&commit.message);
        }

        sort_commits(&mut commits);
        debug!(
            file = file_path,
            function = function_name,
            commits = commits.len(),
            "history collected"
        );
        Ok(commits)
    }

    /// Line range of the function at `revision`, or a funcname range when
    /// the file cannot be read or parsed there
    fn locate_range(
        &self,
        repository: &Path,
        file_path: &str,
        function_name: &str,
        revision: &str,
    ) -> Result<LineRange, VcsError> {
        let fallback = LineRange::FunctionName(simple_name(function_name).to_string());

        let Some(source) = self.vcs.show_file(repository, revision, file_path)? else {
            debug!(file = file_path, revision, "file absent at revision");
            return Ok(fallback);
        };

        let parser = match self.parsers.for_path(Path::new(file_path)) {
            Ok(parser) => parser,
            Err(_) => return Ok(fallback),
        };

        let parsed = match parser.parse(&source, file_path) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(file = file_path, revision, error = %e, "cannot parse file at revision");
                return Ok(fallback);
            }
        };

        match parsed.locate(function_name) {
            Lookup::Found(def) => Ok(LineRange::Lines {
                start: def.span.start_line,
                end: def.span.end_line,
            }),
            Lookup::Ambiguous(_) | Lookup::Missing => Ok(fallback),
        }
    }
}

impl std::fmt::Debug for HistoryCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryCollector")
            .field("parsers", &self.parsers)
            .finish_non_exhaustive()
    }
}

/// Last segment of a qualified name (`Worker.run` -> `run`)
fn simple_name(function_name: &str) -> &str {
    function_name
        .rsplit(['.', ':'])
        .find(|s| !s.is_empty())
        .unwrap_or(function_name)
}

/// Issue references in commit message order, without duplicates
pub fn extract_issue_ids(message: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for caps in ISSUE_PATTERN.captures_iter(message) {
        let Some(m) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let id = m.as_str().to_string();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// Order commits by `(timestamp, hash)` ascending
pub fn sort_commits(commits: &mut [CommitRecord]) {
    commits.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.hash.cmp(&b.hash))
    });
}
