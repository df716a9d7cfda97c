//! Persistence collaborators
//!
//! - [`IntelligenceStore`]: point read/write of analysis records by
//!   `(repository_id, function_key, fingerprint)` plus a per-function
//!   history query
//! - [`BlobStore`]: content-addressed artifacts (diffs, call-graph snapshots)
//!
//! Writes are last-writer-wins upserts; nothing is merged.

mod blob;
mod memory;
mod sqlite;

pub use blob::{ArtifactType, BlobKey, BlobStore, FsBlobStore, MemoryBlobStore};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::model::{FunctionIntelligence, FunctionRef};
use async_trait::async_trait;

/// Composite primary key of a stored record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub repository_id: String,
    /// `{file_path}#{function_name}`
    pub function_key: String,
    pub fingerprint: String,
}

impl RecordKey {
    pub fn for_function(function: &FunctionRef) -> Self {
        RecordKey {
            repository_id: function.repository_id.clone(),
            function_key: function.function_key(),
            fingerprint: function.fingerprint.clone(),
        }
    }
}

/// Metadata store for analysis records
#[async_trait]
pub trait IntelligenceStore: Send + Sync {
    /// Point read; `None` when nothing is stored under `key`
    async fn get(&self, key: &RecordKey) -> Result<Option<FunctionIntelligence>, StoreError>;

    /// Upsert keyed by the record's function reference
    async fn put(&self, record: &FunctionIntelligence) -> Result<(), StoreError>;

    /// Every record for `function_name` in the repository (any file, any
    /// fingerprint), oldest first
    async fn history(
        &self,
        repository_id: &str,
        function_name: &str,
    ) -> Result<Vec<FunctionIntelligence>, StoreError>;
}

/// Oldest first; fingerprint and file break ties so the order is total
pub(crate) fn sort_history(records: &mut [FunctionIntelligence]) {
    records.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.function.file_path.cmp(&b.function.file_path))
            .then_with(|| a.function.fingerprint.cmp(&b.function.fingerprint))
    });
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::model::*;
    use chrono::{DateTime, TimeZone, Utc};

    pub fn sample_record(
        file: &str,
        function: &str,
        fingerprint: &str,
        created_at: DateTime<Utc>,
    ) -> FunctionIntelligence {
        FunctionIntelligence {
            function: FunctionRef::new("repo-0123456789ab", file, function, fingerprint),
            narrative: IntentNarrative {
                intent_summary: "Validates incoming orders.".to_string(),
                dependency_overview: "Called by the HTTP layer.".to_string(),
                risk_assessment: "Low churn, moderate fan-in.".to_string(),
            },
            dependencies: DependencySummary {
                upstream: vec!["api.py::submit".to_string()],
                downstream: vec!["db.py::save".to_string()],
                impact_radius_size: 2,
            },
            metrics: ComplexityMetrics {
                cyclomatic_complexity: 4,
                lines_of_code: 17,
                parameter_count: 2,
                modification_frequency: 3,
                call_site_count: 1,
            },
            stability_score: StabilityScore::new(0.1234567890123),
            risk_level: RiskLevel::Stable,
            recommendations: vec!["Extract the discount rules.".to_string()],
            commits: vec![],
            synthesis: SynthesisStatus::Complete,
            degradations: vec![Degradation::new(Stage::History, "shallow clone")],
            created_at,
            format_version: ANALYSIS_FORMAT_VERSION,
        }
    }

    pub fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 123_456_789)
            .single()
            .unwrap_or_default()
    }
}
