//! Rendering of function intelligence records
//!
//! Global invariants enforced:
//! - Deterministic output ordering
//! - Byte-for-byte identical output for identical records

use crate::model::{FunctionIntelligence, SynthesisStatus};
use chrono::{TimeZone, Utc};

/// Render one record as a human-readable report
pub fn render_text(record: &FunctionIntelligence) -> String {
    let mut output = String::new();
    let function = &record.function;

    output.push_str(&format!(
        "{} ({})\n",
        function.function_key(),
        short_fingerprint(&function.fingerprint)
    ));
    output.push_str(&format!(
        "Stability: {:.2}  Risk: {}\n",
        record.stability_score.value(),
        record.risk_level
    ));
    if record.is_fully_analyzed() {
        output.push_str("Analysis: complete\n");
    } else {
        output.push_str(&format!(
            "Analysis: partial ({} degraded)\n",
            record.degradations.len()
        ));
    }
    if let SynthesisStatus::Partial { reason } = &record.synthesis {
        output.push_str(&format!("Synthesis: partial ({})\n", reason));
    }

    output.push_str("\nIntent\n");
    push_paragraph(&mut output, &record.narrative.intent_summary);
    output.push_str("\nDependencies\n");
    push_paragraph(&mut output, &record.narrative.dependency_overview);
    output.push_str("\nRisk assessment\n");
    push_paragraph(&mut output, &record.narrative.risk_assessment);

    let m = &record.metrics;
    output.push_str("\nMetrics\n");
    output.push_str(&format!(
        "  {:<24} {}\n",
        "cyclomatic complexity", m.cyclomatic_complexity
    ));
    output.push_str(&format!("  {:<24} {}\n", "lines of code", m.lines_of_code));
    output.push_str(&format!("  {:<24} {}\n", "parameters", m.parameter_count));
    output.push_str(&format!(
        "  {:<24} {}\n",
        "modifications", m.modification_frequency
    ));
    output.push_str(&format!("  {:<24} {}\n", "call sites", m.call_site_count));

    let deps = &record.dependencies;
    output.push_str("\nCall graph\n");
    output.push_str(&format!("  callers ({})\n", deps.upstream.len()));
    for caller in &deps.upstream {
        output.push_str(&format!("    {}\n", caller));
    }
    output.push_str(&format!("  callees ({})\n", deps.downstream.len()));
    for callee in &deps.downstream {
        output.push_str(&format!("    {}\n", callee));
    }
    output.push_str(&format!("  impact radius: {}\n", deps.impact_radius_size));

    if !record.commits.is_empty() {
        output.push_str(&format!("\nHistory ({} commits)\n", record.commits.len()));
        for commit in &record.commits {
            let issues = if commit.issue_ids.is_empty() {
                String::new()
            } else {
                format!(" [{}]", commit.issue_ids.join(", "))
            };
            output.push_str(&format!(
                "  {} {} {:<16} {}{}\n",
                short_hash(&commit.hash),
                format_date(commit.timestamp),
                truncate_or_pad(&commit.author, 16),
                commit.subject,
                issues
            ));
        }
    }

    output.push_str("\nRecommendations\n");
    for recommendation in &record.recommendations {
        output.push_str(&format!("  - {}\n", recommendation));
    }

    if !record.degradations.is_empty() {
        output.push_str("\nDegraded stages\n");
        for degradation in &record.degradations {
            output.push_str(&format!(
                "  {:<10} {}\n",
                degradation.stage.as_str(),
                degradation.reason
            ));
        }
    }

    output
}

/// Render one record as pretty JSON, plus a top-level `fully_analyzed` flag
pub fn render_json(record: &FunctionIntelligence) -> String {
    let Ok(mut value) = serde_json::to_value(record) else {
        return "{}".to_string();
    };
    if let Some(object) = value.as_object_mut() {
        object.insert(
            "fully_analyzed".to_string(),
            serde_json::Value::Bool(record.is_fully_analyzed()),
        );
    }
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
}

/// Render stored records as a table, one row per analysis
pub fn render_history(records: &[FunctionIntelligence]) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{:<20} {:<18} {:<8} {:<14} {:<30} {}\n",
        "CREATED", "FINGERPRINT", "SCORE", "RISK", "FILE", "STATUS"
    ));
    for record in records {
        // partial: placeholder narrative; degraded: another stage was absorbed
        let status = if record.is_partial() {
            "partial"
        } else if !record.is_fully_analyzed() {
            "degraded"
        } else {
            "complete"
        };
        let score = format!("{:.2}", record.stability_score.value());
        output.push_str(&format!(
            "{:<20} {:<18} {:<8} {:<14} {:<30} {}\n",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            short_fingerprint(record.fingerprint()),
            score,
            record.risk_level.as_str(),
            truncate_or_pad(&record.function.file_path, 30),
            status
        ));
    }
    output
}

/// Render stored records as a JSON array
pub fn render_history_json(records: &[FunctionIntelligence]) -> String {
    serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".to_string())
}

fn push_paragraph(output: &mut String, text: &str) {
    for line in text.lines() {
        output.push_str("  ");
        output.push_str(line.trim_end());
        output.push('\n');
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

/// `HEAD+digest` fingerprints keep both parts visible
fn short_fingerprint(fingerprint: &str) -> String {
    match fingerprint.split_once('+') {
        Some((base, digest)) => format!("{}+{}", short_hash(base), short_hash(digest)),
        None => short_hash(fingerprint).to_string(),
    }
}

fn format_date(timestamp: i64) -> String {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Truncate or pad string to fixed width
fn truncate_or_pad(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        format!("{:<width$}", s, width = width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommitDigest, Degradation, Stage};
    use crate::store::test_support::{at, sample_record};

    #[test]
    fn test_text_report_sections() {
        let mut record = sample_record("src/app.py", "handle", "0123456789abcdef", at(0));
        record.degradations.clear();
        record.commits = vec![CommitDigest {
            hash: "fedcba9876543210".to_string(),
            author: "Dev".to_string(),
            timestamp: 1_700_000_000,
            subject: "Fix rounding".to_string(),
            issue_ids: vec!["#42".to_string()],
        }];
        let text = render_text(&record);
        assert!(text.starts_with("src/app.py#handle (01234567)\n"));
        assert!(text.contains("\nIntent\n"));
        assert!(text.contains("fedcba98 2023-11-14"));
        assert!(text.contains("Fix rounding [#42]"));
        assert!(!text.contains("Degraded stages"));
        assert!(text.contains("Analysis: complete\n"));
    }

    #[test]
    fn test_text_report_lists_degradations() {
        let mut record = sample_record("src/app.py", "handle", "abc", at(0));
        record.synthesis = SynthesisStatus::Partial {
            reason: "rate limited".to_string(),
        };
        record
            .degradations
            .push(Degradation::new(Stage::Synthesis, "rate limited"));
        let text = render_text(&record);
        assert!(text.contains("Synthesis: partial (rate limited)"));
        assert!(text.contains("Analysis: partial (2 degraded)\n"));
        assert!(text.contains("Degraded stages\n  history"));
        assert!(text.contains("  synthesis  rate limited\n"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let record = sample_record("src/app.py", "handle", "abc", at(5));
        assert_eq!(render_text(&record), render_text(&record));
        assert_eq!(render_json(&record), render_json(&record));
    }

    #[test]
    fn test_json_round_trips() {
        let record = sample_record("src/app.py", "handle", "abc", at(5));
        let parsed: FunctionIntelligence = serde_json::from_str(&render_json(&record)).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_json_flags_full_analysis() {
        let mut record = sample_record("src/app.py", "handle", "abc", at(5));
        let degraded: serde_json::Value = serde_json::from_str(&render_json(&record)).unwrap();
        assert_eq!(degraded["fully_analyzed"], false);

        record.degradations.clear();
        let complete: serde_json::Value = serde_json::from_str(&render_json(&record)).unwrap();
        assert_eq!(complete["fully_analyzed"], true);
    }

    #[test]
    fn test_dirty_fingerprint_keeps_both_parts() {
        let record = sample_record(
            "src/app.py",
            "handle",
            "0123456789abcdef+fedcba9876543210",
            at(0),
        );
        assert!(render_text(&record).starts_with("src/app.py#handle (01234567+fedcba98)\n"));
        assert_eq!(short_fingerprint("worktree+fedcba9876543210"), "worktree+fedcba98");
        assert_eq!(short_fingerprint("0123456789abcdef"), "01234567");
    }

    #[test]
    fn test_history_table_rows() {
        let records = vec![
            sample_record("src/app.py", "handle", "aaaaaaaaaaaa", at(0)),
            sample_record("src/app.py", "handle", "bbbbbbbbbbbb", at(60)),
        ];
        let table = render_history(&records);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("CREATED"));
        assert!(lines[1].contains("aaaaaaaa"));
        assert!(lines[2].starts_with("2023-11-14 22:14:20"));
        // sample records carry a history degradation
        assert!(lines[1].ends_with("degraded"));
    }

    #[test]
    fn test_truncate_or_pad() {
        assert_eq!(truncate_or_pad("abc", 5), "abc  ");
        assert_eq!(truncate_or_pad("abcdefgh", 6), "abc...");
    }
}
