//! Error taxonomy for the analysis pipeline
//!
//! Stage-fatal failures surface as `AnalysisError`. Recoverable failures
//! (history access, cache reads, synthesis) are absorbed by the pipeline and
//! recorded as degradation notes instead of being returned.

use crate::model::Stage;
use thiserror::Error;

/// Failure reported by the version-control collaborator.
///
/// "No commits found" is never an error: readers return an empty list.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("not a git repository: {0}")]
    NotARepository(String),

    #[error("failed to invoke git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {args} failed: {stderr}")]
    Command { args: String, stderr: String },

    #[error("unexpected git output: {0}")]
    InvalidOutput(String),
}

/// Failure reported by a persistence collaborator (metadata or blob store).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Syntax error reported by a source parser.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("parse error at {location}: {message}")]
pub struct ParseError {
    /// `file:line:column` of the first offending token (1-based line and column)
    pub location: String,
    pub message: String,
}

impl ParseError {
    pub fn at(file: &str, line: usize, column: usize, message: impl Into<String>) -> Self {
        ParseError {
            location: format!("{}:{}:{}", file, line, column),
            message: message.into(),
        }
    }
}

/// Two definitions share one qualified name but disagree on signature.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("ambiguous function identity `{name}`: `{first}` conflicts with `{second}`")]
pub struct GraphConstructionError {
    pub name: String,
    pub first: String,
    pub second: String,
}

/// Errors returned by the analysis pipeline and its stages.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// History stage: repository missing, corrupted or unreadable
    #[error("repository access failed: {0}")]
    RepositoryAccess(#[from] VcsError),

    /// Structural stage: the target file does not parse
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Structural stage: no parser is registered for the file extension
    #[error("unsupported language for {path}")]
    UnsupportedLanguage { path: String },

    /// Structural stage: ambiguous identity of the target
    #[error(transparent)]
    GraphConstruction(#[from] GraphConstructionError),

    /// Structural stage: the parser did not recognize the requested function
    #[error("function `{function}` not found in {file}")]
    FunctionNotFound { file: String, function: String },

    /// Structural stage: the target source could not be read
    #[error("failed to read {path}: {source}")]
    SourceUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A stage exceeded its time bound
    #[error("{stage} stage timed out after {secs}s")]
    StageTimeout { stage: Stage, secs: u64 },

    /// The structural stage failed; the request cannot be answered
    #[error("analysis unavailable: {0}")]
    AnalysisUnavailable(#[source] Box<AnalysisError>),

    /// Metadata store unreachable
    #[error("cache error: {0}")]
    Cache(#[from] StoreError),

    /// The caller cancelled the request
    #[error("analysis cancelled")]
    Cancelled,

    /// A stage task panicked or was aborted
    #[error("{stage} stage task failed: {message}")]
    TaskFailed { stage: Stage, message: String },
}

impl AnalysisError {
    /// Wrap a structural-stage failure as the request-fatal error.
    pub fn unavailable(cause: AnalysisError) -> Self {
        match cause {
            already @ AnalysisError::AnalysisUnavailable(_) => already,
            other => AnalysisError::AnalysisUnavailable(Box::new(other)),
        }
    }

    /// The structural cause behind an `AnalysisUnavailable`, or `self`.
    pub fn root_cause(&self) -> &AnalysisError {
        match self {
            AnalysisError::AnalysisUnavailable(inner) => inner.root_cause(),
            other => other,
        }
    }
}
