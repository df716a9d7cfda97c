//! Configuration file support for Lineage
//!
//! Loads project-specific configuration from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.lineagerc.json` in the repository root
//! 3. `lineage.config.json` in the repository root
//!
//! All fields are optional. Missing fields take the documented defaults.

use crate::scoring::{MetricRange, NormalizationRanges};
use crate::synthesis::RetryPolicy;
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default exclude patterns applied when no config is specified
const DEFAULT_EXCLUDES: &[&str] = &[
    "**/node_modules/**",
    "**/target/**",
    "**/vendor/**",
    "**/dist/**",
    "**/build/**",
    "**/.git/**",
];

pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_TOKEN_BUDGET: usize = 4000;
pub const MIN_TOKEN_BUDGET: usize = 256;
pub const DEFAULT_LLM_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_LLM_MODEL: &str = "claude-3-5-sonnet-latest";
pub const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const DEFAULT_STORE_PATH: &str = ".lineage/intelligence.db";
pub const DEFAULT_BLOB_DIR: &str = ".lineage/blobs";

/// Lineage configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineageConfig {
    /// Glob patterns for files feeding the call graph (default: all supported extensions)
    #[serde(default)]
    pub include: Vec<String>,

    /// Glob patterns for files to skip (default: vendored and build directories)
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Per-metric normalization ranges
    #[serde(default)]
    pub ranges: Option<RangeConfig>,

    /// Cache validity window in hours (default: 24)
    #[serde(default)]
    pub cache_ttl_hours: Option<i64>,

    /// Per-stage time bound in seconds (default: 120)
    #[serde(default)]
    pub stage_timeout_secs: Option<u64>,

    #[serde(default)]
    pub synthesis: Option<SynthesisConfig>,

    #[serde(default)]
    pub llm: Option<LlmConfig>,

    #[serde(default)]
    pub store: Option<StoreConfig>,
}

/// `[min, max]` pairs; missing metrics keep their defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RangeConfig {
    pub complexity: Option<[f64; 2]>,
    pub modification_frequency: Option<[f64; 2]>,
    pub call_sites: Option<[f64; 2]>,
    pub lines_of_code: Option<[f64; 2]>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SynthesisConfig {
    /// Prompt budget in estimated tokens (default: 4000)
    pub token_budget: Option<usize>,
    /// Retries after the first attempt (default: 3)
    pub max_retries: Option<u32>,
    /// Delay before the first retry (default: 1000)
    pub initial_backoff_ms: Option<u64>,
    /// Upper bound on any single delay (default: 8000)
    pub max_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    /// Environment variable holding the API key (default: ANTHROPIC_API_KEY)
    pub api_key_env: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// SQLite metadata store, relative to the repository root
    pub path: Option<PathBuf>,
    /// Blob directory, relative to the repository root
    pub blob_dir: Option<PathBuf>,
}

/// Compiled include/exclude patterns over repository-relative paths
#[derive(Debug, Clone)]
pub struct PathFilter {
    /// Compiled include patterns (None means include all)
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl PathFilter {
    /// Compile patterns; an empty exclude list falls back to the defaults
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = if include.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in include {
                builder.add(Glob::new(pattern)?);
            }
            Some(builder.build()?)
        };

        let exclude = {
            let mut builder = GlobSetBuilder::new();
            if exclude.is_empty() {
                for pattern in DEFAULT_EXCLUDES {
                    builder.add(Glob::new(pattern)?);
                }
            } else {
                for pattern in exclude {
                    builder.add(Glob::new(pattern)?);
                }
            }
            builder.build()?
        };

        Ok(PathFilter { include, exclude })
    }

    /// Check if a repository-relative path should be analyzed
    pub fn should_include(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy().replace('\\', "/");

        if self.exclude.is_match(&path_str) {
            return false;
        }

        if let Some(ref include) = self.include {
            return include.is_match(&path_str);
        }

        true
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        let exclude = {
            let mut builder = GlobSetBuilder::new();
            for pattern in DEFAULT_EXCLUDES {
                if let Ok(glob) = Glob::new(pattern) {
                    builder.add(glob);
                }
            }
            builder.build().unwrap_or_else(|_| GlobSet::empty())
        };
        PathFilter {
            include: None,
            exclude,
        }
    }
}

/// Configuration with every default applied
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    #[serde(skip)]
    pub filter: PathFilter,
    pub ranges: NormalizationRanges,
    pub cache_ttl_hours: i64,
    pub stage_timeout_secs: u64,
    pub token_budget: usize,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub llm_endpoint: String,
    pub llm_model: String,
    pub api_key_env: String,
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
    pub store_path: PathBuf,
    pub blob_dir: PathBuf,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

fn check_range(name: &str, range: Option<[f64; 2]>) -> Result<()> {
    if let Some([min, max]) = range {
        if !min.is_finite() || !max.is_finite() {
            anyhow::bail!("ranges.{} must be finite (got [{}, {}])", name, min, max);
        }
        if min > max {
            anyhow::bail!(
                "ranges.{} min ({}) must not exceed max ({})",
                name,
                min,
                max
            );
        }
    }
    Ok(())
}

fn resolve_range(range: Option<[f64; 2]>, default: MetricRange) -> MetricRange {
    range
        .map(|[min, max]| MetricRange::new(min, max))
        .unwrap_or(default)
}

impl LineageConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        if let Some(ref r) = self.ranges {
            check_range("complexity", r.complexity)?;
            check_range("modification_frequency", r.modification_frequency)?;
            check_range("call_sites", r.call_sites)?;
            check_range("lines_of_code", r.lines_of_code)?;
        }

        if let Some(ttl) = self.cache_ttl_hours {
            if ttl <= 0 {
                anyhow::bail!("cache_ttl_hours must be positive (got {})", ttl);
            }
        }

        if self.stage_timeout_secs == Some(0) {
            anyhow::bail!("stage_timeout_secs must be positive (got 0)");
        }

        if let Some(ref s) = self.synthesis {
            if let Some(budget) = s.token_budget {
                if budget < MIN_TOKEN_BUDGET {
                    anyhow::bail!(
                        "synthesis.token_budget must be at least {} (got {})",
                        MIN_TOKEN_BUDGET,
                        budget
                    );
                }
            }
            let policy = RetryPolicy::default();
            let initial = s.initial_backoff_ms.unwrap_or(millis(policy.initial_backoff));
            let max = s.max_backoff_ms.unwrap_or(millis(policy.max_backoff));
            if max < initial {
                anyhow::bail!(
                    "synthesis.max_backoff_ms ({}) must not be less than initial_backoff_ms ({})",
                    max,
                    initial
                );
            }
        }

        if let Some(ref l) = self.llm {
            if l.request_timeout_secs == Some(0) {
                anyhow::bail!("llm.request_timeout_secs must be positive (got 0)");
            }
            if l.max_output_tokens == Some(0) {
                anyhow::bail!("llm.max_output_tokens must be positive (got 0)");
            }
            if let Some(ref endpoint) = l.endpoint {
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    anyhow::bail!("llm.endpoint must be an http(s) URL (got {})", endpoint);
                }
            }
        }

        for pattern in &self.include {
            Glob::new(pattern).with_context(|| format!("invalid include pattern: {}", pattern))?;
        }
        for pattern in &self.exclude {
            Glob::new(pattern).with_context(|| format!("invalid exclude pattern: {}", pattern))?;
        }

        Ok(())
    }

    /// Resolve config into compiled form ready for use
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let filter = PathFilter::new(&self.include, &self.exclude)?;

        let defaults = NormalizationRanges::default();
        let ranges = match &self.ranges {
            Some(r) => NormalizationRanges {
                complexity: resolve_range(r.complexity, defaults.complexity),
                modification_frequency: resolve_range(
                    r.modification_frequency,
                    defaults.modification_frequency,
                ),
                call_sites: resolve_range(r.call_sites, defaults.call_sites),
                lines_of_code: resolve_range(r.lines_of_code, defaults.lines_of_code),
            },
            None => defaults,
        };

        let synthesis = self.synthesis.clone().unwrap_or_default();
        let policy = RetryPolicy::default();
        let llm = self.llm.clone().unwrap_or_default();
        let store = self.store.clone().unwrap_or_default();

        let exclude = if self.exclude.is_empty() {
            DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect()
        } else {
            self.exclude.clone()
        };

        Ok(ResolvedConfig {
            include: self.include.clone(),
            exclude,
            filter,
            ranges,
            cache_ttl_hours: self
                .cache_ttl_hours
                .unwrap_or(crate::cache::DEFAULT_TTL_HOURS),
            stage_timeout_secs: self.stage_timeout_secs.unwrap_or(DEFAULT_STAGE_TIMEOUT_SECS),
            token_budget: synthesis.token_budget.unwrap_or(DEFAULT_TOKEN_BUDGET),
            max_retries: synthesis.max_retries.unwrap_or(policy.max_retries),
            initial_backoff_ms: synthesis
                .initial_backoff_ms
                .unwrap_or(millis(policy.initial_backoff)),
            max_backoff_ms: synthesis
                .max_backoff_ms
                .unwrap_or(millis(policy.max_backoff)),
            llm_endpoint: llm
                .endpoint
                .unwrap_or_else(|| DEFAULT_LLM_ENDPOINT.to_string()),
            llm_model: llm.model.unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            api_key_env: llm
                .api_key_env
                .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
            max_output_tokens: llm.max_output_tokens.unwrap_or(1024),
            request_timeout_secs: llm.request_timeout_secs.unwrap_or(60),
            store_path: store
                .path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            blob_dir: store
                .blob_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BLOB_DIR)),
            config_path: None,
        })
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl ResolvedConfig {
    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Result<Self> {
        LineageConfig::default().resolve()
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_ttl_hours)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    /// Store and blob locations anchored at the repository root
    pub fn store_paths(&self, repository_root: &Path) -> (PathBuf, PathBuf) {
        (
            repository_root.join(&self.store_path),
            repository_root.join(&self.blob_dir),
        )
    }
}

/// Discover and load a config file from the repository root
///
/// Search order:
/// 1. `.lineagerc.json`
/// 2. `lineage.config.json`
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(project_root: &Path) -> Result<Option<(LineageConfig, PathBuf)>> {
    for name in [".lineagerc.json", "lineage.config.json"] {
        let path = project_root.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<LineageConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: LineageConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config for a repository
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config from the repository root.
/// Returns default config if nothing is found.
pub fn load_and_resolve(project_root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(project_root)? {
            Some((config, path)) => (config, Some(path)),
            None => (LineageConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    Ok(resolved)
}
