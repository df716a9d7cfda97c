//! Shared helpers for integration tests
//!
//! Global test rules:
//! - Real git repos in temp directories
//! - No fixed SHAs
//! - Commit dates are pinned so history order is deterministic

#![allow(dead_code)]

use async_trait::async_trait;
use lineage_core::error::{StoreError, VcsError};
use lineage_core::git::{GitCli, LineRange, VersionControl};
use lineage_core::llm::{LlmError, LlmProvider};
use lineage_core::model::{CommitRecord, FunctionIntelligence};
use lineage_core::store::{BlobKey, BlobStore, IntelligenceStore, MemoryStore, RecordKey};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// First pinned commit date (unix seconds)
pub const BASE_TIMESTAMP: i64 = 1_700_000_000;

/// A reply carrying all four sections
pub const COMPLETE_REPLY: &str = r#"```json
{
  "intent_summary": "Applies the order discount.",
  "dependency_overview": "Called by main; delegates to helper.",
  "risk_assessment": "Low churn and low complexity.",
  "refactoring_recommendations": ["Name the discount constant"]
}
```"#;

/// Create a temporary git repository for testing
pub fn create_temp_git_repo() -> tempfile::TempDir {
    let temp_dir = tempfile::tempdir().expect("failed to create temp directory");
    let repo_path = temp_dir.path();

    git_command(repo_path, &["init", "--initial-branch=main"]);
    git_command(repo_path, &["config", "user.name", "Test User"]);
    git_command(repo_path, &["config", "user.email", "test@example.com"]);
    // Disable commit signing (may be configured globally in some environments)
    git_command(repo_path, &["config", "commit.gpgsign", "false"]);
    fs::write(repo_path.join(".gitignore"), ".lineage/\n").expect("failed to write .gitignore");

    temp_dir
}

/// Run a git command in the repository
pub fn git_command(repo_path: &Path, args: &[&str]) -> String {
    git_command_with_env(repo_path, args, &[])
}

fn git_command_with_env(repo_path: &Path, args: &[&str], env: &[(&str, String)]) -> String {
    let mut command = Command::new("git");
    command.current_dir(repo_path).args(args);
    for (key, value) in env {
        command.env(key, value);
    }
    let output = command
        .output()
        .unwrap_or_else(|_| panic!("failed to run git {:?}", args));

    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Write a source file, creating parent directories
pub fn write_file(repo_path: &Path, path: &str, content: &str) {
    let file_path = repo_path.join(path);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent).expect("failed to create directory");
    }
    fs::write(&file_path, content).expect("failed to write file");
}

/// Commit all changes with a pinned date; returns the new HEAD
pub fn git_commit(repo_path: &Path, message: &str, timestamp: i64) -> String {
    let date = format!("@{} +0000", timestamp);
    let env = [
        ("GIT_AUTHOR_DATE", date.clone()),
        ("GIT_COMMITTER_DATE", date),
    ];
    git_command(repo_path, &["add", "."]);
    git_command_with_env(repo_path, &["commit", "-m", message], &env);
    git_command(repo_path, &["rev-parse", "HEAD"])
}

/// Provider returning a fixed result and counting calls
pub struct CountingProvider {
    reply: Result<String, LlmError>,
    calls: AtomicUsize,
}

impl CountingProvider {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(CountingProvider {
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(error: LlmError) -> Arc<Self> {
        Arc::new(CountingProvider {
            reply: Err(error),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for CountingProvider {
    async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}

/// Metadata store with unreachable reads, writes, or both
pub struct FailingStore {
    inner: MemoryStore,
    fail_reads: bool,
    fail_writes: bool,
}

impl FailingStore {
    /// Reads fail; writes land in memory
    pub fn unreadable() -> Arc<Self> {
        Arc::new(FailingStore {
            inner: MemoryStore::new(),
            fail_reads: true,
            fail_writes: false,
        })
    }

    /// Writes fail; reads see an empty store
    pub fn unwritable() -> Arc<Self> {
        Arc::new(FailingStore {
            inner: MemoryStore::new(),
            fail_reads: false,
            fail_writes: true,
        })
    }

    /// Records that made it into the inner store
    pub async fn stored(&self, repository_id: &str, function_name: &str) -> Vec<FunctionIntelligence> {
        self.inner
            .history(repository_id, function_name)
            .await
            .unwrap_or_default()
    }

    fn refused() -> StoreError {
        StoreError::Unavailable("connection refused".to_string())
    }
}

#[async_trait]
impl IntelligenceStore for FailingStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<FunctionIntelligence>, StoreError> {
        if self.fail_reads {
            return Err(Self::refused());
        }
        self.inner.get(key).await
    }

    async fn put(&self, record: &FunctionIntelligence) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(Self::refused());
        }
        self.inner.put(record).await
    }

    async fn history(
        &self,
        repository_id: &str,
        function_name: &str,
    ) -> Result<Vec<FunctionIntelligence>, StoreError> {
        if self.fail_reads {
            return Err(Self::refused());
        }
        self.inner.history(repository_id, function_name).await
    }
}

/// Blob store that rejects every write
pub struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn put(&self, _key: &BlobKey, _content: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }

    async fn get(&self, _key: &BlobKey) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(None)
    }
}

/// Git operation a [`StallingVcs`] holds up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stall {
    /// History walk (`git log -L`)
    ListCommits,
    /// Tree listing used to index a committed revision
    ListFiles,
}

/// Real git reader that sleeps before one operation
pub struct StallingVcs {
    inner: GitCli,
    stall: Stall,
    delay: Duration,
}

impl StallingVcs {
    pub fn new(stall: Stall, delay: Duration) -> Arc<Self> {
        Arc::new(StallingVcs {
            inner: GitCli::new(),
            stall,
            delay,
        })
    }

    fn maybe_stall(&self, call: Stall) {
        if self.stall == call {
            std::thread::sleep(self.delay);
        }
    }
}

impl VersionControl for StallingVcs {
    fn ensure_repository(&self, repo: &Path) -> Result<(), VcsError> {
        self.inner.ensure_repository(repo)
    }

    fn resolve_revision(&self, repo: &Path, rev: &str) -> Result<String, VcsError> {
        self.inner.resolve_revision(repo, rev)
    }

    fn show_file(&self, repo: &Path, rev: &str, path: &str) -> Result<Option<String>, VcsError> {
        self.inner.show_file(repo, rev, path)
    }

    fn list_files(&self, repo: &Path, rev: &str) -> Result<Vec<String>, VcsError> {
        self.maybe_stall(Stall::ListFiles);
        self.inner.list_files(repo, rev)
    }

    fn list_commits(
        &self,
        repo: &Path,
        path: &str,
        range: &LineRange,
        rev: &str,
    ) -> Result<Vec<CommitRecord>, VcsError> {
        self.maybe_stall(Stall::ListCommits);
        self.inner.list_commits(repo, path, range, rev)
    }

    fn diff(
        &self,
        repo: &Path,
        commit: &str,
        path: &str,
        range: &LineRange,
    ) -> Result<String, VcsError> {
        self.inner.diff(repo, commit, path, range)
    }
}
