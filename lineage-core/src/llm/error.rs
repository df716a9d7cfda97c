//! LLM-specific error types
//!
//! Typed errors let the synthesis client decide whether a failure is worth
//! retrying.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    /// Authentication failed (missing or rejected API key)
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Request was invalid (bad parameters, too many tokens, etc.)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    /// 5xx or overloaded
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Provider returned a body that is not a completion
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The service is deliberately not configured (offline mode)
    #[error("llm disabled: {0}")]
    Disabled(String),
}

impl LlmError {
    /// Transient failures: timeout, rate limit, network, 5xx
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited(_)
                | LlmError::Network(_)
                | LlmError::Timeout
                | LlmError::ServiceUnavailable(_)
        )
    }

    /// Map an HTTP status and body to an error
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status, truncate(body, 200));
        match status {
            401 | 403 => LlmError::Authentication(message),
            408 => LlmError::Timeout,
            429 => LlmError::RateLimited(message),
            // 529 is the provider's "overloaded" status
            500..=599 => LlmError::ServiceUnavailable(message),
            _ => LlmError::InvalidRequest(message),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_connect() {
            LlmError::Network(format!("connection failed: {}", err))
        } else if err.is_decode() {
            LlmError::InvalidResponse(err.to_string())
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::InvalidResponse(format!("JSON parse error: {}", err))
    }
}
