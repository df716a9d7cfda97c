//! Parsing of the model's structured reply
//!
//! The model is asked for one JSON object:
//!
//! ```json
//! {
//!   "intent_summary": "...",
//!   "dependency_overview": "...",
//!   "risk_assessment": "...",
//!   "refactoring_recommendations": ["..."]
//! }
//! ```
//!
//! Replies often wrap it in a fenced block or prose, so the first balanced
//! JSON object in the text is used.

use serde::Deserialize;
use thiserror::Error;

/// The four sections of a complete reply
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SynthesisReply {
    pub intent_summary: String,
    pub dependency_overview: String,
    pub risk_assessment: String,
    pub refactoring_recommendations: Vec<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReplyError {
    #[error("reply contains no JSON object")]
    NoJson,

    #[error("reply is not valid JSON: {0}")]
    Malformed(String),

    #[error("reply is missing section `{0}`")]
    MissingSection(&'static str),
}

const SECTIONS: [&str; 4] = [
    "intent_summary",
    "dependency_overview",
    "risk_assessment",
    "refactoring_recommendations",
];

/// Parse a reply into its four sections
///
/// # Errors
///
/// `ReplyError` when no object is found, it does not parse, or any section is
/// absent or blank.
pub fn parse_reply(text: &str) -> Result<SynthesisReply, ReplyError> {
    let json = extract_json_object(text).ok_or(ReplyError::NoJson)?;
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| ReplyError::Malformed(e.to_string()))?;

    for section in SECTIONS {
        let present = match value.get(section) {
            Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
            Some(serde_json::Value::Array(items)) => !items.is_empty(),
            _ => false,
        };
        if !present {
            return Err(ReplyError::MissingSection(section));
        }
    }

    let reply: SynthesisReply =
        serde_json::from_value(value).map_err(|e| ReplyError::Malformed(e.to_string()))?;
    let recommendations: Vec<String> = reply
        .refactoring_recommendations
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    if recommendations.is_empty() {
        return Err(ReplyError::MissingSection("refactoring_recommendations"));
    }

    Ok(SynthesisReply {
        intent_summary: reply.intent_summary.trim().to_string(),
        dependency_overview: reply.dependency_overview.trim().to_string(),
        risk_assessment: reply.risk_assessment.trim().to_string(),
        refactoring_recommendations: recommendations,
    })
}

/// First balanced `{...}` in `text`, honouring string literals
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETE: &str = r#"{
        "intent_summary": "Applies discount rules to an order.",
        "dependency_overview": "Called by checkout; calls the pricing table.",
        "risk_assessment": "Moderate: frequent edits around tax handling.",
        "refactoring_recommendations": ["Split tax handling out", "  "]
    }"#;

    #[test]
    fn test_parse_plain_object() {
        let reply = parse_reply(COMPLETE).unwrap();
        assert_eq!(reply.intent_summary, "Applies discount rules to an order.");
        assert_eq!(reply.refactoring_recommendations, vec!["Split tax handling out"]);
    }

    #[test]
    fn test_parse_fenced_object_with_prose() {
        let text = format!("Here is the analysis:\n```json\n{}\n```\nLet me know!", COMPLETE);
        assert!(parse_reply(&text).is_ok());
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"{"intent_summary": "Formats {placeholders}", "dependency_overview": "none }", "risk_assessment": "low", "refactoring_recommendations": ["keep"]}"#;
        let reply = parse_reply(text).unwrap();
        assert_eq!(reply.intent_summary, "Formats {placeholders}");
    }

    #[test]
    fn test_missing_section_is_rejected() {
        let text = r#"{"intent_summary": "x", "dependency_overview": "y", "risk_assessment": "z"}"#;
        assert_eq!(
            parse_reply(text),
            Err(ReplyError::MissingSection("refactoring_recommendations"))
        );
    }

    #[test]
    fn test_blank_section_is_rejected() {
        let text = r#"{"intent_summary": " ", "dependency_overview": "y", "risk_assessment": "z", "refactoring_recommendations": ["a"]}"#;
        assert_eq!(
            parse_reply(text),
            Err(ReplyError::MissingSection("intent_summary"))
        );
    }

    #[test]
    fn test_no_json() {
        assert_eq!(parse_reply("I cannot help with that."), Err(ReplyError::NoJson));
        assert_eq!(parse_reply("{ unterminated"), Err(ReplyError::NoJson));
    }
}
