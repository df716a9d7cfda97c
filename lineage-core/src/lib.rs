//! Lineage core library - function intelligence from git history, call graphs
//! and complexity metrics, synthesized into a narrative by a language model

#![deny(warnings)]

// Global invariants enforced in this crate:
// - Analysis is per function, keyed by (repository, file, function, commit)
// - Records are immutable; a new analysis supersedes, never patches
// - Only the structural stage is allowed to fail a request
// - Collections that reach output are sorted deterministically
// - Formatting, comments, and whitespace must not affect metrics

pub mod cache;
pub mod callgraph;
pub mod codebase;
pub mod config;
pub mod error;
pub mod git;
pub mod history;
pub mod language;
pub mod llm;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod store;
pub mod synthesis;

pub use callgraph::CallGraph;
pub use config::ResolvedConfig;
pub use error::AnalysisError;
pub use git::{GitCli, VersionControl};
pub use model::{FunctionIntelligence, FunctionRef, RiskLevel, StabilityScore};
pub use pipeline::{AnalysisRequest, Pipeline, PipelineOptions, PipelineSettings};
pub use report::{render_history, render_json, render_text};
