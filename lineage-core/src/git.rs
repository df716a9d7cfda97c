//! Version-control access
//!
//! Reads commit history, file contents and range-restricted diffs through
//! the git CLI (no libgit2) for portability.
//!
//! Global invariants enforced:
//! - "No commits found" is an empty list, never an error
//! - A path or function that does not exist at a revision is an empty result
//! - Only an unreadable repository or a failing git invocation is an error

use crate::error::VcsError;
use crate::model::CommitRecord;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;

const RECORD_SEPARATOR: char = '\u{1e}';
const FIELD_SEPARATOR: char = '\u{1f}';

/// `%x1e` starts each commit, `%x1f` separates hash, author, time, body and patch
const LOG_FORMAT: &str = "--format=%x1e%H%x1f%an%x1f%at%x1f%B%x1f";

/// Lines of a file that history should be restricted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRange {
    /// Inclusive 1-based line numbers at the starting revision
    Lines { start: u32, end: u32 },
    /// Let git locate the function by name (funcname regex)
    FunctionName(String),
}

impl LineRange {
    /// The `-L` argument for `git log`
    pub fn log_arg(&self, path: &str) -> String {
        match self {
            LineRange::Lines { start, end } => format!("-L{},{}:{}", start, end, path),
            LineRange::FunctionName(name) => {
                format!("-L:{}:{}", regex::escape(name), path)
            }
        }
    }
}

/// Version-control reader used by the history stage
///
/// Implementations are blocking; async callers run them on a blocking thread.
pub trait VersionControl: Send + Sync {
    /// Fail with `NotARepository` unless `repo` is readable as a repository
    fn ensure_repository(&self, repo: &Path) -> Result<(), VcsError>;

    /// Resolve a revision expression to a full commit hash
    fn resolve_revision(&self, repo: &Path, rev: &str) -> Result<String, VcsError>;

    /// File contents at a revision; `None` when the path does not exist there
    fn show_file(&self, repo: &Path, rev: &str, path: &str) -> Result<Option<String>, VcsError>;

    /// Repository-relative paths of every file tracked at a revision
    fn list_files(&self, repo: &Path, rev: &str) -> Result<Vec<String>, VcsError>;

    /// Commits reachable from `rev` that touched `range` of `path`, newest first.
    ///
    /// Each record's `diff` holds the patch restricted to the range, or is
    /// empty when the reader does not embed patches.
    fn list_commits(
        &self,
        repo: &Path,
        path: &str,
        range: &LineRange,
        rev: &str,
    ) -> Result<Vec<CommitRecord>, VcsError>;

    /// Patch of `commit` restricted to `range` of `path`
    fn diff(
        &self,
        repo: &Path,
        commit: &str,
        path: &str,
        range: &LineRange,
    ) -> Result<String, VcsError>;
}

/// `VersionControl` backed by the git command-line tool
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        GitCli
    }
}

/// Execute a git command in a specific directory and return the trimmed stdout
fn git_at(repo_path: &Path, args: &[&str]) -> Result<String, VcsError> {
    let output = Command::new("git")
        .current_dir(repo_path)
        .args(args)
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound if !repo_path.exists() => {
                VcsError::NotARepository(repo_path.display().to_string())
            }
            _ => VcsError::Spawn(e),
        })?;

    if !output.status.success() {
        return Err(VcsError::Command {
            args: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Failures git reports when a path or line range has nothing to show
fn is_empty_history(err: &VcsError) -> bool {
    match err {
        VcsError::Command { stderr, .. } => {
            stderr.contains("no match")
                || stderr.contains("There is no path")
                || stderr.contains("does not exist")
                || stderr.contains("has only")
                || stderr.contains("does not have any commits yet")
        }
        _ => false,
    }
}

impl VersionControl for GitCli {
    fn ensure_repository(&self, repo: &Path) -> Result<(), VcsError> {
        if !repo.is_dir() {
            return Err(VcsError::NotARepository(repo.display().to_string()));
        }
        // `rev-parse --git-dir` exits non-zero outside a repository
        git_at(repo, &["rev-parse", "--git-dir"])
            .map(|_| ())
            .map_err(|_| VcsError::NotARepository(repo.display().to_string()))
    }

    fn resolve_revision(&self, repo: &Path, rev: &str) -> Result<String, VcsError> {
        let target = format!("{}^{{commit}}", rev);
        let sha = git_at(repo, &["rev-parse", "--verify", "--quiet", &target])?;
        if sha.is_empty() {
            return Err(VcsError::InvalidOutput(format!("cannot resolve {}", rev)));
        }
        Ok(sha)
    }

    fn show_file(&self, repo: &Path, rev: &str, path: &str) -> Result<Option<String>, VcsError> {
        let object = format!("{}:{}", rev, path);
        match git_at(repo, &["show", &object]) {
            Ok(content) => Ok(Some(content)),
            Err(e) if is_empty_history(&e) || is_missing_object(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list_files(&self, repo: &Path, rev: &str) -> Result<Vec<String>, VcsError> {
        // NUL-separated so unusual file names arrive unquoted
        let listing = git_at(repo, &["ls-tree", "-r", "-z", "--name-only", rev])?;
        Ok(listing
            .split('\0')
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn list_commits(
        &self,
        repo: &Path,
        path: &str,
        range: &LineRange,
        rev: &str,
    ) -> Result<Vec<CommitRecord>, VcsError> {
        let range_arg = range.log_arg(path);
        let args = [
            "log",
            "--no-color",
            "--no-ext-diff",
            LOG_FORMAT,
            range_arg.as_str(),
            rev,
        ];
        match git_at(repo, &args) {
            Ok(output) => parse_log_output(&output),
            Err(e) if is_empty_history(&e) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn diff(
        &self,
        repo: &Path,
        commit: &str,
        path: &str,
        range: &LineRange,
    ) -> Result<String, VcsError> {
        let range_arg = range.log_arg(path);
        let args = [
            "log",
            "-1",
            "--no-color",
            "--no-ext-diff",
            "--format=",
            range_arg.as_str(),
            commit,
        ];
        match git_at(repo, &args) {
            Ok(patch) => Ok(patch),
            Err(e) if is_empty_history(&e) => Ok(String::new()),
            Err(e) => Err(e),
        }
    }
}

fn is_missing_object(err: &VcsError) -> bool {
    matches!(err, VcsError::Command { stderr, .. }
        if stderr.contains("exists on disk, but not in") || stderr.contains("invalid object name"))
}

/// Parse `git log` output produced with [`LOG_FORMAT`]
fn parse_log_output(output: &str) -> Result<Vec<CommitRecord>, VcsError> {
    let mut commits = Vec::new();

    for record in output.split(RECORD_SEPARATOR) {
        if record.trim().is_empty() {
            continue;
        }
        let mut fields = record.splitn(5, FIELD_SEPARATOR);
        let (Some(hash), Some(author), Some(timestamp), Some(message)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(VcsError::InvalidOutput(format!(
                "truncated log record: {}",
                record.chars().take(60).collect::<String>()
            )));
        };
        let patch = fields.next().unwrap_or("");

        let timestamp = timestamp.trim().parse::<i64>().map_err(|_| {
            VcsError::InvalidOutput(format!("invalid commit timestamp `{}`", timestamp))
        })?;

        commits.push(CommitRecord {
            hash: hash.trim().to_string(),
            message: message.trim().to_string(),
            author: author.trim().to_string(),
            timestamp,
            issue_ids: Vec::new(),
            diff: patch.trim_matches('\n').to_string(),
        });
    }

    Ok(commits)
}
