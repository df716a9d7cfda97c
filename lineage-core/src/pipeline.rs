//! Function intelligence pipeline
//!
//! Per request:
//!
//! ```text
//! CacheCheck -> hit:  return the stored record unchanged
//!            -> miss: {History || Structure} -> Score -> Synthesis -> Persist
//! ```
//!
//! The fingerprint and the analyzed source always agree. An explicit commit is
//! parsed as committed. Without one the working tree is parsed, and the
//! fingerprint is `HEAD` while the target file matches its committed version,
//! else `HEAD` plus a digest of the file (`worktree+digest` outside git).
//!
//! History and structure run concurrently on blocking threads, each under the
//! stage timeout. Structure is load-bearing: its failure fails the request
//! with `AnalysisUnavailable`. Every other failure (cache read, history,
//! synthesis, persistence) is absorbed and recorded as a degradation note.

use crate::cache;
use crate::codebase::{self, SourceTree, StructuralAnalysis};
use crate::config::{PathFilter, ResolvedConfig};
use crate::error::AnalysisError;
use crate::git::{GitCli, VersionControl};
use crate::history::HistoryCollector;
use crate::language::ParserRegistry;
use crate::llm::{AnthropicProvider, LlmProvider, UnavailableProvider};
use crate::metrics;
use crate::model::{
    normalize_path, repository_id, CommitDigest, CommitRecord, Degradation, DependencySummary,
    FunctionIntelligence, FunctionRef, Stage, SynthesisStatus, ANALYSIS_FORMAT_VERSION,
};
use crate::scoring::{self, NormalizationRanges};
use crate::store::{
    ArtifactType, BlobKey, BlobStore, FsBlobStore, IntelligenceStore, MemoryBlobStore,
    MemoryStore, RecordKey, SqliteStore,
};
use crate::synthesis::{
    ComplexityInputs, NarrativeInputs, StructuralInputs, SynthesisClient,
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fingerprint base used when the repository has no resolvable `HEAD`
pub const WORKTREE_FINGERPRINT: &str = "worktree";

/// Hex characters of the content digest appended to a dirty fingerprint
const CONTENT_DIGEST_LEN: usize = 16;

/// The source an analysis reads and the fingerprint that names it
#[derive(Debug, Clone)]
struct Snapshot {
    fingerprint: String,
    tree: SourceTree,
    /// Revision the history stage walks back from
    revision: String,
}

/// One `analyze` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub repository_root: PathBuf,
    /// Repository-relative path of the file defining the function
    pub file_path: String,
    pub function_name: String,
    /// Commit to analyze against; `HEAD` when omitted
    pub commit: Option<String>,
}

impl AnalysisRequest {
    pub fn new(
        repository_root: impl Into<PathBuf>,
        file_path: impl Into<String>,
        function_name: impl Into<String>,
    ) -> Self {
        AnalysisRequest {
            repository_root: repository_root.into(),
            file_path: normalize_path(&file_path.into()),
            function_name: function_name.into(),
            commit: None,
        }
    }

    pub fn at_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }
}

/// Tunables applied to every request
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub ranges: NormalizationRanges,
    pub cache_ttl: chrono::Duration,
    pub stage_timeout: Duration,
    pub filter: PathFilter,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            ranges: NormalizationRanges::default(),
            cache_ttl: cache::default_ttl(),
            stage_timeout: Duration::from_secs(crate::config::DEFAULT_STAGE_TIMEOUT_SECS),
            filter: PathFilter::default(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        PipelineSettings {
            ranges: config.ranges,
            cache_ttl: config.cache_ttl(),
            stage_timeout: config.stage_timeout(),
            filter: config.filter.clone(),
        }
    }
}

/// How the CLI wires collaborators
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Keep records in memory instead of the on-disk store
    pub ephemeral: bool,
    /// Never call the model; every result is partial
    pub offline: bool,
}

/// Orchestrates one analysis per request
#[derive(Clone)]
pub struct Pipeline {
    vcs: Arc<dyn VersionControl>,
    parsers: ParserRegistry,
    store: Arc<dyn IntelligenceStore>,
    blobs: Arc<dyn BlobStore>,
    synthesis: SynthesisClient,
    settings: PipelineSettings,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("parsers", &self.parsers)
            .field("synthesis", &self.synthesis)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        vcs: Arc<dyn VersionControl>,
        store: Arc<dyn IntelligenceStore>,
        blobs: Arc<dyn BlobStore>,
        synthesis: SynthesisClient,
    ) -> Self {
        Pipeline {
            vcs,
            parsers: ParserRegistry::with_default_parsers(),
            store,
            blobs,
            synthesis,
            settings: PipelineSettings::default(),
        }
    }

    pub fn with_parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Wire the git CLI, the configured stores and the model provider
    ///
    /// Store paths are resolved against `repository_root`. A missing API key
    /// is not an error: synthesis degrades to partial results.
    pub fn from_config(
        repository_root: &Path,
        config: &ResolvedConfig,
        options: PipelineOptions,
    ) -> anyhow::Result<Self> {
        use anyhow::Context;

        let (store, blobs): (Arc<dyn IntelligenceStore>, Arc<dyn BlobStore>) =
            if options.ephemeral {
                (Arc::new(MemoryStore::new()), Arc::new(MemoryBlobStore::new()))
            } else {
                let (db_path, blob_dir) = config.store_paths(repository_root);
                let store = SqliteStore::open(&db_path).with_context(|| {
                    format!("failed to open intelligence store: {}", db_path.display())
                })?;
                (Arc::new(store), Arc::new(FsBlobStore::new(blob_dir)))
            };

        let provider: Arc<dyn LlmProvider> = if options.offline {
            Arc::new(UnavailableProvider::new("offline mode"))
        } else {
            match std::env::var(&config.api_key_env) {
                Ok(key) if !key.trim().is_empty() => Arc::new(
                    AnthropicProvider::new(
                        config.llm_endpoint.clone(),
                        key,
                        config.llm_model.clone(),
                        config.max_output_tokens,
                        config.request_timeout(),
                    )
                    .context("failed to configure the model provider")?,
                ),
                _ => {
                    warn!(env = %config.api_key_env, "API key not set; synthesis disabled");
                    Arc::new(UnavailableProvider::new(format!(
                        "{} is not set",
                        config.api_key_env
                    )))
                }
            }
        };

        let synthesis =
            SynthesisClient::new(provider, config.token_budget, config.retry_policy());

        Ok(Pipeline::new(Arc::new(GitCli::new()), store, blobs, synthesis)
            .with_settings(PipelineSettings::from_config(config)))
    }

    /// Analyze one function
    ///
    /// # Errors
    ///
    /// `AnalysisUnavailable` when the structural stage fails. All other stage
    /// failures are reported in the result's degradations.
    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> Result<FunctionIntelligence, AnalysisError> {
        self.analyze_with_cancellation(request, &CancellationToken::new())
            .await
    }

    /// Analyze one function, giving up with `Cancelled` when `cancel` fires
    ///
    /// Blocking stage work already started runs to completion in the
    /// background. Nothing is persisted after cancellation.
    pub async fn analyze_with_cancellation(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
    ) -> Result<FunctionIntelligence, AnalysisError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(function = %request.function_name, "analysis cancelled");
                Err(AnalysisError::Cancelled)
            }
            result = self.run(request, cancel) => result,
        }
    }

    /// Stored records for a function name, oldest first
    ///
    /// # Errors
    ///
    /// `AnalysisError::Cache` when the store cannot be read.
    pub async fn history(
        &self,
        repository_root: &Path,
        function_name: &str,
    ) -> Result<Vec<FunctionIntelligence>, AnalysisError> {
        let repo_id = repository_id(repository_root);
        Ok(self.store.history(&repo_id, function_name).await?)
    }

    async fn run(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
    ) -> Result<FunctionIntelligence, AnalysisError> {
        let root = request.repository_root.clone();
        let file_path = normalize_path(&request.file_path);
        let function_name = request.function_name.clone();
        let mut degradations = Vec::new();

        let Snapshot {
            fingerprint,
            tree,
            revision,
        } = self.snapshot(request, &file_path, &mut degradations).await;
        let function = FunctionRef::new(
            repository_id(&root),
            &file_path,
            function_name.clone(),
            fingerprint.clone(),
        );

        // CacheCheck
        match self.store.get(&RecordKey::for_function(&function)).await {
            Ok(Some(record)) => {
                let verdict =
                    cache::evaluate(&record, Utc::now(), &fingerprint, self.settings.cache_ttl);
                if verdict.is_hit() {
                    info!(function = %function.function_key(), %fingerprint, "cache hit");
                    return Ok(record);
                }
                debug!(function = %function.function_key(), verdict = verdict.as_str(), "cache miss");
            }
            Ok(None) => debug!(function = %function.function_key(), "no cached record"),
            Err(e) => {
                warn!(function = %function.function_key(), error = %e, "cache read failed");
                degradations.push(Degradation::new(Stage::Cache, e.to_string()));
            }
        }

        // ParallelAnalysis
        let collector = HistoryCollector::new(Arc::clone(&self.vcs), self.parsers.clone());
        let history_root = root.clone();
        let history_file = file_path.clone();
        let history_function = function_name.clone();
        let history = self.run_blocking(Stage::History, move || {
            collector
                .collect(&history_root, &history_file, &history_function, &revision)
                .map_err(AnalysisError::from)
        });

        let parsers = self.parsers.clone();
        let filter = self.settings.filter.clone();
        let structure_root = root.clone();
        let structure_file = file_path.clone();
        let structure_function = function_name.clone();
        let structure = self.run_blocking(Stage::Structure, move || {
            codebase::analyze_structure(
                &structure_root,
                &tree,
                &structure_file,
                &structure_function,
                &parsers,
                &filter,
            )
        });

        let (history, structure) = tokio::join!(history, structure);

        let structure: StructuralAnalysis = structure.map_err(|e| {
            warn!(function = %function.function_key(), error = %e, "structural stage failed");
            AnalysisError::unavailable(e)
        })?;
        for note in &structure.notes {
            degradations.push(Degradation::new(Stage::Structure, note.clone()));
        }

        let commits: Vec<CommitRecord> = match history {
            Ok(commits) => commits,
            Err(e) => {
                warn!(function = %function.function_key(), error = %e, "history stage failed");
                degradations.push(Degradation::new(Stage::History, e.to_string()));
                Vec::new()
            }
        };

        // Score
        let metrics =
            metrics::assemble(&structure.target, commits.len(), structure.call_site_count());
        let (stability_score, risk_level) = scoring::score(&metrics, &self.settings.ranges);
        debug!(
            function = %function.function_key(),
            score = stability_score.value(),
            risk = %risk_level,
            "scored"
        );

        // Synthesis
        let outcome = self
            .synthesis
            .synthesize(
                &function,
                &NarrativeInputs {
                    commits: commits.clone(),
                },
                &StructuralInputs::from_analysis(&structure),
                &ComplexityInputs {
                    metrics,
                    score: stability_score,
                    risk_level,
                },
            )
            .await;
        if let SynthesisStatus::Partial { reason } = &outcome.status {
            degradations.push(Degradation::new(Stage::Synthesis, reason.clone()));
        }

        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        let mut record = FunctionIntelligence {
            function,
            narrative: outcome.narrative,
            dependencies: DependencySummary {
                upstream: structure.upstream.iter().cloned().collect(),
                downstream: structure.downstream.iter().cloned().collect(),
                impact_radius_size: structure.impact_radius.len(),
            },
            metrics,
            stability_score,
            risk_level,
            recommendations: outcome.recommendations,
            commits: commits.iter().map(CommitDigest::from).collect(),
            synthesis: outcome.status,
            degradations,
            created_at: Utc::now(),
            format_version: ANALYSIS_FORMAT_VERSION,
        };

        // Persist
        self.persist_artifacts(&mut record, &commits, &structure).await;
        if let Err(e) = self.store.put(&record).await {
            warn!(function = %record.function.function_key(), error = %e, "failed to persist record");
            record
                .degradations
                .push(Degradation::new(Stage::Persist, e.to_string()));
        }

        info!(
            function = %record.function.function_key(),
            risk = %record.risk_level,
            degradations = record.degradations.len(),
            "analysis complete"
        );
        Ok(record)
    }

    /// Decide what to parse and fingerprint for `request`
    ///
    /// Resolution failures are recorded as history degradations; an
    /// unresolvable explicit commit still fails later in the structural stage.
    async fn snapshot(
        &self,
        request: &AnalysisRequest,
        file_path: &str,
        degradations: &mut Vec<Degradation>,
    ) -> Snapshot {
        let vcs = Arc::clone(&self.vcs);
        let root = request.repository_root.clone();

        if let Some(commit) = &request.commit {
            let rev = commit.clone();
            let resolved = self
                .run_blocking(Stage::History, move || {
                    vcs.resolve_revision(&root, &rev).map_err(AnalysisError::from)
                })
                .await;
            let sha = resolved.unwrap_or_else(|e| {
                warn!(%commit, error = %e, "cannot resolve commit");
                degradations.push(Degradation::new(
                    Stage::History,
                    format!("cannot resolve {}: {}", commit, e),
                ));
                commit.clone()
            });
            return Snapshot {
                fingerprint: sha.clone(),
                tree: SourceTree::at_revision(Arc::clone(&self.vcs), sha.clone()),
                revision: sha,
            };
        }

        let path = file_path.to_string();
        let observed = self
            .run_blocking(Stage::History, move || {
                let head = vcs
                    .resolve_revision(&root, "HEAD")
                    .map_err(|e| e.to_string());
                let committed = match &head {
                    Ok(sha) => vcs.show_file(&root, sha, &path).ok().flatten(),
                    Err(_) => None,
                };
                let current = std::fs::read_to_string(root.join(&path)).ok();
                Ok((head, committed, current))
            })
            .await;

        let (head, committed, current) = match observed {
            Ok(observed) => observed,
            Err(e) => (Err(e.to_string()), None, None),
        };
        let head = match head {
            Ok(sha) => Some(sha),
            Err(e) => {
                warn!(root = %request.repository_root.display(), error = %e, "cannot resolve HEAD");
                degradations.push(Degradation::new(
                    Stage::History,
                    format!("cannot resolve HEAD, analyzing the working tree: {}", e),
                ));
                None
            }
        };

        Snapshot {
            fingerprint: worktree_fingerprint(
                head.as_deref(),
                committed.as_deref(),
                current.as_deref(),
            ),
            tree: SourceTree::Worktree,
            revision: head.unwrap_or_else(|| "HEAD".to_string()),
        }
    }

    /// Store diffs and the call-graph snapshot; failures become degradations
    async fn persist_artifacts(
        &self,
        record: &mut FunctionIntelligence,
        commits: &[CommitRecord],
        structure: &StructuralAnalysis,
    ) {
        let repo_id = record.function.repository_id.clone();
        let function_key = record.function.function_key();

        let mut artifacts: Vec<(ArtifactType, Vec<u8>)> = commits
            .iter()
            .filter(|c| !c.diff.is_empty())
            .map(|c| (ArtifactType::Diffs, c.diff.clone().into_bytes()))
            .collect();
        match serde_json::to_vec(&structure.graph.snapshot(&structure.target_id)) {
            Ok(snapshot) => artifacts.push((ArtifactType::CallGraphs, snapshot)),
            Err(e) => record
                .degradations
                .push(Degradation::new(Stage::Persist, e.to_string())),
        }

        for (artifact, content) in artifacts {
            let key = BlobKey::for_content(&repo_id, artifact, &function_key, &content);
            if let Err(e) = self.blobs.put(&key, &content).await {
                warn!(key = %key, error = %e, "failed to store artifact");
                record.degradations.push(Degradation::new(
                    Stage::Persist,
                    format!("artifact {}: {}", key, e),
                ));
            }
        }
    }

    /// Run blocking stage work under the stage timeout
    async fn run_blocking<T, F>(&self, stage: Stage, work: F) -> Result<T, AnalysisError>
    where
        F: FnOnce() -> Result<T, AnalysisError> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(work);
        match tokio::time::timeout(self.settings.stage_timeout, handle).await {
            Err(_) => Err(AnalysisError::StageTimeout {
                stage,
                secs: self.settings.stage_timeout.as_secs(),
            }),
            Ok(Err(join_error)) => Err(AnalysisError::TaskFailed {
                stage,
                message: join_error.to_string(),
            }),
            Ok(Ok(result)) => result,
        }
    }
}

/// Fingerprint of a working-tree analysis
///
/// `HEAD` while the target file matches its committed content, otherwise the
/// base (`HEAD` or [`WORKTREE_FINGERPRINT`]) plus a digest of the current file.
fn worktree_fingerprint(
    head: Option<&str>,
    committed: Option<&str>,
    current: Option<&str>,
) -> String {
    let Some(current) = current else {
        return head.unwrap_or(WORKTREE_FINGERPRINT).to_string();
    };
    match head {
        // Committed content comes back trimmed from git
        Some(sha) if committed.is_some_and(|c| c.trim() == current.trim()) => sha.to_string(),
        base => format!(
            "{}+{}",
            base.unwrap_or(WORKTREE_FINGERPRINT),
            content_digest(current)
        ),
    }
}

fn content_digest(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex.truncate(CONTENT_DIGEST_LEN);
    hex
}
