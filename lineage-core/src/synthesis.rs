//! Narrative synthesis
//!
//! Builds one bounded prompt from the history, structure and complexity
//! signals, calls the model with retry and backoff, and parses the reply.
//!
//! Truncation priority when the prompt exceeds its token budget:
//! 1. Complexity metrics and the score are never dropped
//! 2. Structural edges: direct callers and callees are kept, other edges are
//!    dropped farthest-first
//! 3. Commit history: oldest commits are dropped first
//!
//! Synthesis never fails. When the model stays unavailable, or its reply is
//! missing a section, the result is partial: the narrative carries the
//! "synthesis unavailable" marker and the reason.

use crate::codebase::StructuralAnalysis;
use crate::llm::{parse_reply, LlmProvider};
use crate::model::{
    CommitRecord, ComplexityMetrics, FunctionRef, IntentNarrative, RiskLevel, StabilityScore,
    SynthesisStatus, SYNTHESIS_UNAVAILABLE,
};
use chrono::DateTime;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Characters per estimated token
const CHARS_PER_TOKEN: usize = 4;

/// Estimated token count of `text` (ceil of chars / 4)
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Exponential backoff for transient model failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `retry` (1-based): `min(initial * 2^(retry-1), max)`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// History signal
#[derive(Debug, Clone, Default)]
pub struct NarrativeInputs {
    /// Oldest first
    pub commits: Vec<CommitRecord>,
}

/// Structure signal
#[derive(Debug, Clone, Default)]
pub struct StructuralInputs {
    pub target_id: String,
    pub signature: String,
    pub upstream: Vec<String>,
    pub downstream: Vec<String>,
    pub impact_radius_size: usize,
    /// Edges not touching the target, most relevant first
    pub indirect_edges: Vec<(String, String)>,
}

impl StructuralInputs {
    pub fn from_analysis(analysis: &StructuralAnalysis) -> Self {
        let target = analysis.target_id.as_str();
        let distances = analysis.graph.distances(target);
        let snapshot = analysis.graph.snapshot(target);

        let mut indirect: Vec<(usize, (String, String))> = snapshot
            .edges
            .into_iter()
            .filter(|(caller, callee)| caller != target && callee != target)
            .map(|edge| {
                let far = distances
                    .get(&edge.0)
                    .copied()
                    .unwrap_or(usize::MAX)
                    .max(distances.get(&edge.1).copied().unwrap_or(usize::MAX));
                (far, edge)
            })
            .collect();
        indirect.sort();

        StructuralInputs {
            target_id: analysis.target_id.clone(),
            signature: analysis.target.signature.clone(),
            upstream: analysis.upstream.iter().cloned().collect(),
            downstream: analysis.downstream.iter().cloned().collect(),
            impact_radius_size: analysis.impact_radius.len(),
            indirect_edges: indirect.into_iter().map(|(_, edge)| edge).collect(),
        }
    }
}

/// Complexity signal
#[derive(Debug, Clone, Copy)]
pub struct ComplexityInputs {
    pub metrics: ComplexityMetrics,
    pub score: StabilityScore,
    pub risk_level: RiskLevel,
}

/// What the prompt budget forced out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TruncationReport {
    pub edges_dropped: usize,
    pub commits_dropped: usize,
}

impl TruncationReport {
    pub fn is_truncated(&self) -> bool {
        self.edges_dropped > 0 || self.commits_dropped > 0
    }
}

/// Output of one synthesis run
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOutcome {
    pub narrative: IntentNarrative,
    pub recommendations: Vec<String>,
    pub status: SynthesisStatus,
    /// Model calls made
    pub attempts: u32,
    pub truncation: TruncationReport,
}

impl SynthesisOutcome {
    fn partial(reason: String, attempts: u32, truncation: TruncationReport) -> Self {
        SynthesisOutcome {
            narrative: IntentNarrative::unavailable(&reason),
            recommendations: vec![format!("{}: {}", SYNTHESIS_UNAVAILABLE, reason)],
            status: SynthesisStatus::Partial { reason },
            attempts,
            truncation,
        }
    }
}

/// Model-backed narrative synthesis
#[derive(Clone)]
pub struct SynthesisClient {
    provider: Arc<dyn LlmProvider>,
    token_budget: usize,
    retry: RetryPolicy,
}

impl std::fmt::Debug for SynthesisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisClient")
            .field("token_budget", &self.token_budget)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl SynthesisClient {
    pub fn new(provider: Arc<dyn LlmProvider>, token_budget: usize, retry: RetryPolicy) -> Self {
        SynthesisClient {
            provider,
            token_budget,
            retry,
        }
    }

    /// Synthesize a narrative; never fails
    pub async fn synthesize(
        &self,
        function: &FunctionRef,
        narrative: &NarrativeInputs,
        structural: &StructuralInputs,
        complexity: &ComplexityInputs,
    ) -> SynthesisOutcome {
        let (prompt, truncation) =
            build_prompt(function, narrative, structural, complexity, self.token_budget);
        debug!(
            function = %function.function_key(),
            tokens = estimate_tokens(&prompt),
            edges_dropped = truncation.edges_dropped,
            commits_dropped = truncation.commits_dropped,
            "built synthesis prompt"
        );

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let error = match self.provider.complete(&prompt).await {
                Ok(text) => {
                    return match parse_reply(&text) {
                        Ok(reply) => SynthesisOutcome {
                            narrative: IntentNarrative {
                                intent_summary: reply.intent_summary,
                                dependency_overview: reply.dependency_overview,
                                risk_assessment: reply.risk_assessment,
                            },
                            recommendations: reply.refactoring_recommendations,
                            status: SynthesisStatus::Complete,
                            attempts: attempt,
                            truncation,
                        },
                        // a format problem is not retried
                        Err(e) => {
                            warn!(function = %function.function_key(), error = %e, "unusable synthesis reply");
                            SynthesisOutcome::partial(e.to_string(), attempt, truncation)
                        }
                    };
                }
                Err(e) => e,
            };

            if error.is_retryable() && attempt <= self.retry.max_retries {
                let delay = self.retry.delay_for(attempt);
                warn!(
                    function = %function.function_key(),
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "transient synthesis failure; retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            warn!(
                function = %function.function_key(),
                attempt,
                error = %error,
                "synthesis unavailable"
            );
            let reason = if error.is_retryable() {
                format!("{} (after {} attempts)", error, attempt)
            } else {
                error.to_string()
            };
            return SynthesisOutcome::partial(reason, attempt, truncation);
        }
    }
}

const INSTRUCTIONS: &str = "You are reviewing one function in a software repository. \
Using the signals below, explain why the function exists, how it connects to the rest \
of the code, and how risky it is to change.\n\n\
Reply with a single JSON object with exactly these keys:\n\
- \"intent_summary\": string, the purpose of the function and how it evolved\n\
- \"dependency_overview\": string, who calls it and what it relies on\n\
- \"risk_assessment\": string, what makes changes risky or safe\n\
- \"refactoring_recommendations\": array of strings, concrete and ordered by value\n";

/// Compose the prompt within `token_budget`
pub fn build_prompt(
    function: &FunctionRef,
    narrative: &NarrativeInputs,
    structural: &StructuralInputs,
    complexity: &ComplexityInputs,
    token_budget: usize,
) -> (String, TruncationReport) {
    let mut report = TruncationReport::default();
    let mut prompt = String::new();

    prompt.push_str(INSTRUCTIONS);
    let _ = write!(
        prompt,
        "\n## Function\n{} in {}\n",
        function.function_name, function.file_path
    );
    if !structural.signature.is_empty() {
        let _ = writeln!(prompt, "Signature: {}", structural.signature);
    }

    let m = &complexity.metrics;
    let _ = write!(
        prompt,
        "\n## Complexity\n\
         - cyclomatic complexity: {}\n\
         - lines of code: {}\n\
         - parameters: {}\n\
         - modification frequency: {} commits\n\
         - call sites: {}\n\
         - stability score: {:.3} ({})\n",
        m.cyclomatic_complexity,
        m.lines_of_code,
        m.parameter_count,
        m.modification_frequency,
        m.call_site_count,
        complexity.score.value(),
        complexity.risk_level
    );

    let _ = write!(
        prompt,
        "\n## Structure\nImpact radius: {} functions\n",
        structural.impact_radius_size
    );
    for caller in &structural.upstream {
        let _ = writeln!(prompt, "- called by {}", caller);
    }
    for callee in &structural.downstream {
        let _ = writeln!(prompt, "- calls {}", callee);
    }

    let fits = |prompt: &str, line: &str| estimate_tokens(prompt) + estimate_tokens(line) <= token_budget;

    let mut edges = structural.indirect_edges.iter();
    for (caller, callee) in edges.by_ref() {
        let line = format!("- {} -> {}\n", caller, callee);
        if !fits(&prompt, &line) {
            report.edges_dropped += 1;
            break;
        }
        prompt.push_str(&line);
    }
    report.edges_dropped += edges.count();

    let header = "\n## History (newest first)\n";
    if narrative.commits.is_empty() {
        prompt.push_str(header);
        prompt.push_str("No recorded commits.\n");
    } else if fits(&prompt, header) {
        prompt.push_str(header);
        let mut commits = narrative.commits.iter().rev();
        for commit in commits.by_ref() {
            let line = commit_line(commit);
            if !fits(&prompt, &line) {
                report.commits_dropped += 1;
                break;
            }
            prompt.push_str(&line);
        }
        report.commits_dropped += commits.count();
    } else {
        report.commits_dropped = narrative.commits.len();
    }

    (prompt, report)
}

fn commit_line(commit: &CommitRecord) -> String {
    let date = DateTime::from_timestamp(commit.timestamp, 0)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| commit.timestamp.to_string());
    let short: String = commit.hash.chars().take(10).collect();
    let mut line = format!("- {} {} {}: {}", date, short, commit.author, commit.subject());
    if !commit.issue_ids.is_empty() {
        let issues: BTreeSet<&str> = commit.issue_ids.iter().map(String::as_str).collect();
        let _ = write!(line, " [{}]", issues.into_iter().collect::<Vec<_>>().join(", "));
    }
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    const REPLY: &str = r#"{"intent_summary": "Totals an order.", "dependency_overview": "Called by checkout.", "risk_assessment": "Low.", "refactoring_recommendations": ["Add tests for refunds"]}"#;

    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(ScriptedProvider {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::InvalidRequest("script exhausted".to_string())))
        }
    }

    fn rate_limited() -> Result<String, LlmError> {
        Err(LlmError::RateLimited("HTTP 429".to_string()))
    }

    fn function() -> FunctionRef {
        FunctionRef::new("shop-0123456789ab", "orders.py", "total", "abc123")
    }

    fn complexity() -> ComplexityInputs {
        ComplexityInputs {
            metrics: ComplexityMetrics {
                cyclomatic_complexity: 10,
                lines_of_code: 100,
                parameter_count: 2,
                modification_frequency: 5,
                call_site_count: 20,
            },
            score: StabilityScore::new(0.0974),
            risk_level: RiskLevel::Stable,
        }
    }

    fn commit(i: i64) -> CommitRecord {
        CommitRecord {
            hash: format!("{:040x}", i),
            message: format!("Change number {} to the totals logic", i),
            author: "Ada".to_string(),
            timestamp: 1_700_000_000 + i * 3600,
            issue_ids: vec![],
            diff: String::new(),
        }
    }

    async fn run(provider: Arc<ScriptedProvider>) -> SynthesisOutcome {
        let client = SynthesisClient::new(provider, 4000, RetryPolicy::default());
        client
            .synthesize(
                &function(),
                &NarrativeInputs::default(),
                &StructuralInputs::default(),
                &complexity(),
            )
            .await
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(10), Duration::from_secs(8));
    }

    #[test]
    fn test_token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_transient_failures_then_success() {
        let provider = ScriptedProvider::new(vec![
            rate_limited(),
            Err(LlmError::Timeout),
            Err(LlmError::ServiceUnavailable("HTTP 503".to_string())),
            Ok(REPLY.to_string()),
        ]);

        let start = tokio::time::Instant::now();
        let outcome = run(Arc::clone(&provider)).await;
        let elapsed = start.elapsed();

        assert_eq!(outcome.status, SynthesisStatus::Complete);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(provider.calls(), 4);
        assert_eq!(outcome.narrative.intent_summary, "Totals an order.");
        assert_eq!(outcome.recommendations, vec!["Add tests for refunds"]);
        // 1s + 2s + 4s of backoff
        assert!(elapsed >= Duration::from_secs(7), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(7100), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_four_transient_failures_yield_partial() {
        let provider = ScriptedProvider::new(vec![
            rate_limited(),
            rate_limited(),
            rate_limited(),
            rate_limited(),
            Ok(REPLY.to_string()),
        ]);

        let outcome = run(Arc::clone(&provider)).await;

        assert_eq!(provider.calls(), 4);
        match &outcome.status {
            SynthesisStatus::Partial { reason } => {
                assert!(reason.contains("rate limited"), "reason: {reason}");
            }
            other => panic!("expected partial result, got {other:?}"),
        }
        assert!(outcome
            .narrative
            .intent_summary
            .starts_with("synthesis unavailable: rate limited"));
        assert_eq!(outcome.recommendations.len(), 1);
        assert!(outcome.recommendations[0].starts_with(SYNTHESIS_UNAVAILABLE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let provider = ScriptedProvider::new(vec![
            Err(LlmError::Authentication("HTTP 401".to_string())),
            Ok(REPLY.to_string()),
        ]);

        let outcome = run(Arc::clone(&provider)).await;
        assert_eq!(provider.calls(), 1);
        assert!(matches!(outcome.status, SynthesisStatus::Partial { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_incomplete_reply_is_partial_without_retry() {
        let provider = ScriptedProvider::new(vec![
            Ok(r#"{"intent_summary": "x", "dependency_overview": "y"}"#.to_string()),
            Ok(REPLY.to_string()),
        ]);

        let outcome = run(Arc::clone(&provider)).await;
        assert_eq!(provider.calls(), 1);
        match outcome.status {
            SynthesisStatus::Partial { reason } => assert!(reason.contains("risk_assessment")),
            other => panic!("expected partial result, got {other:?}"),
        }
    }

    #[test]
    fn test_prompt_keeps_metrics_and_direct_edges_under_pressure() {
        let structural = StructuralInputs {
            target_id: "orders.py::total".to_string(),
            signature: "def total(order, currency)".to_string(),
            upstream: vec!["api.py::checkout".to_string()],
            downstream: vec!["tax.py::rate".to_string()],
            impact_radius_size: 40,
            indirect_edges: (0..200)
                .map(|i| (format!("mod{i}.py::caller_{i}"), format!("mod{i}.py::callee_{i}")))
                .collect(),
        };
        let narrative = NarrativeInputs {
            commits: (0..100).map(commit).collect(),
        };

        let (prompt, report) = build_prompt(&function(), &narrative, &structural, &complexity(), 600);

        assert!(prompt.contains("cyclomatic complexity: 10"));
        assert!(prompt.contains("stability score: 0.097 (stable)"));
        assert!(prompt.contains("called by api.py::checkout"));
        assert!(prompt.contains("calls tax.py::rate"));
        assert!(report.edges_dropped > 0);
        assert!(prompt.contains("mod0.py::caller_0 -> mod0.py::callee_0"));
        assert!(!prompt.contains("mod199.py::caller_199"));
        assert_eq!(report.commits_dropped, 100);
        assert!(estimate_tokens(&prompt) <= 600);
    }

    #[test]
    fn test_prompt_drops_oldest_commits_first() {
        let narrative = NarrativeInputs {
            commits: (0..60).map(commit).collect(),
        };
        let (prompt, report) = build_prompt(
            &function(),
            &narrative,
            &StructuralInputs::default(),
            &complexity(),
            700,
        );

        assert!(report.commits_dropped > 0);
        assert!(report.commits_dropped < 60);
        assert!(prompt.contains("Change number 59 "));
        assert!(!prompt.contains("Change number 0 "));
        assert!(estimate_tokens(&prompt) <= 700);
    }

    #[test]
    fn test_prompt_within_budget_is_untruncated() {
        let narrative = NarrativeInputs {
            commits: (0..3).map(commit).collect(),
        };
        let (prompt, report) = build_prompt(
            &function(),
            &narrative,
            &StructuralInputs::default(),
            &complexity(),
            4000,
        );
        assert!(!report.is_truncated());
        assert_eq!(prompt.matches("Change number").count(), 3);
    }
}
