//! Data model for function intelligence
//!
//! Global invariants enforced:
//! - Records are immutable once built; a new analysis supersedes, never patches
//! - Paths are normalized to `/` separators
//! - Collections that reach output are sorted deterministically

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Format version stamped on every persisted record
pub const ANALYSIS_FORMAT_VERSION: u32 = 1;

/// Marker placed in narrative and recommendation fields when synthesis failed
pub const SYNTHESIS_UNAVAILABLE: &str = "synthesis unavailable";

/// Identifies a function analyzed against one fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FunctionRef {
    pub repository_id: String,
    pub file_path: String,
    pub function_name: String,
    pub fingerprint: String,
}

impl FunctionRef {
    pub fn new(
        repository_id: impl Into<String>,
        file_path: &str,
        function_name: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        FunctionRef {
            repository_id: repository_id.into(),
            file_path: normalize_path(file_path),
            function_name: function_name.into(),
            fingerprint: fingerprint.into(),
        }
    }

    /// Storage key for the function identity: `{file_path}#{function_name}`
    pub fn function_key(&self) -> String {
        format!("{}#{}", self.file_path, self.function_name)
    }
}

/// Normalize a repository-relative path to forward slashes without a leading `./`
pub fn normalize_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    normalized
        .strip_prefix("./")
        .map(str::to_string)
        .unwrap_or(normalized)
}

/// Stable repository identifier derived from its root directory.
///
/// Format: `{directory-name}-{first 12 hex chars of sha256(canonical path)}`.
pub fn repository_id(root: &Path) -> String {
    let canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let display = canonical.to_string_lossy().replace('\\', "/");
    let name = canonical
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("repository");
    let digest = Sha256::digest(display.as_bytes());
    let hex: String = digest.iter().take(6).map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}", name, hex)
}

/// One commit that touched the function, with the diff restricted to its body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CommitRecord {
    pub hash: String,
    pub message: String,
    pub author: String,
    /// Unix timestamp (seconds)
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issue_ids: Vec<String>,
    pub diff: String,
}

impl CommitRecord {
    /// First line of the commit message
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }
}

/// Condensed commit entry carried in the final result (diffs live in the blob store)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CommitDigest {
    pub hash: String,
    pub author: String,
    pub timestamp: i64,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issue_ids: Vec<String>,
}

impl From<&CommitRecord> for CommitDigest {
    fn from(commit: &CommitRecord) -> Self {
        CommitDigest {
            hash: commit.hash.clone(),
            author: commit.author.clone(),
            timestamp: commit.timestamp,
            subject: commit.subject().to_string(),
            issue_ids: commit.issue_ids.clone(),
        }
    }
}

/// Raw complexity metrics for one function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ComplexityMetrics {
    /// Decision points + 1; always >= 1
    pub cyclomatic_complexity: u32,
    /// Non-empty, non-comment body lines
    pub lines_of_code: u32,
    pub parameter_count: u32,
    /// Number of commits that touched the function
    pub modification_frequency: u32,
    /// Number of distinct direct callers
    pub call_site_count: u32,
}

/// Stability score in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StabilityScore(f64);

impl StabilityScore {
    /// Build a score, clamping into `[0, 1]`
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return StabilityScore(0.0);
        }
        StabilityScore(value.clamp(0.0, 1.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

/// Risk classification derived from the stability score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Stable,
    ModerateRisk,
    HighRisk,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Stable => "stable",
            RiskLevel::ModerateRisk => "moderate_risk",
            RiskLevel::HighRisk => "high_risk",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direct neighbours and reach of the function in the call graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DependencySummary {
    /// Direct callers (sorted)
    pub upstream: Vec<String>,
    /// Direct callees (sorted)
    pub downstream: Vec<String>,
    pub impact_radius_size: usize,
}

/// Synthesized narrative sections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IntentNarrative {
    pub intent_summary: String,
    pub dependency_overview: String,
    pub risk_assessment: String,
}

impl IntentNarrative {
    /// Narrative used when synthesis could not produce one
    pub fn unavailable(reason: &str) -> Self {
        let marker = format!("{}: {}", SYNTHESIS_UNAVAILABLE, reason);
        IntentNarrative {
            intent_summary: marker.clone(),
            dependency_overview: marker.clone(),
            risk_assessment: marker,
        }
    }
}

/// Whether the narrative came from the model or is a placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SynthesisStatus {
    Complete,
    Partial { reason: String },
}

/// Pipeline stage names, used in degradation notes and timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Cache,
    History,
    Structure,
    Synthesis,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Cache => "cache",
            Stage::History => "history",
            Stage::Structure => "structure",
            Stage::Synthesis => "synthesis",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure that was absorbed instead of aborting the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Degradation {
    pub stage: Stage,
    pub reason: String,
}

impl Degradation {
    pub fn new(stage: Stage, reason: impl Into<String>) -> Self {
        Degradation {
            stage,
            reason: reason.into(),
        }
    }
}

/// Aggregate analysis result for one function at one fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FunctionIntelligence {
    pub function: FunctionRef,
    pub narrative: IntentNarrative,
    pub dependencies: DependencySummary,
    pub metrics: ComplexityMetrics,
    pub stability_score: StabilityScore,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
    /// Commits that touched the function, oldest first
    #[serde(default)]
    pub commits: Vec<CommitDigest>,
    pub synthesis: SynthesisStatus,
    #[serde(default)]
    pub degradations: Vec<Degradation>,
    pub created_at: DateTime<Utc>,
    pub format_version: u32,
}

impl FunctionIntelligence {
    pub fn fingerprint(&self) -> &str {
        &self.function.fingerprint
    }

    /// True when no stage failure was absorbed
    pub fn is_fully_analyzed(&self) -> bool {
        self.degradations.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.synthesis, SynthesisStatus::Partial { .. })
    }
}
