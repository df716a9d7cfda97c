//! Language-model collaborator
//!
//! The synthesis client talks to the model through [`LlmProvider`]; the
//! HTTP implementation lives in [`anthropic`].

pub mod anthropic;
mod error;
pub mod response;

pub use anthropic::AnthropicProvider;
pub use error::LlmError;
pub use response::{parse_reply, ReplyError, SynthesisReply};

use async_trait::async_trait;

/// Text-completion service
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete one prompt
    ///
    /// # Errors
    ///
    /// `LlmError`; callers use [`LlmError::is_retryable`] to decide whether
    /// another attempt can succeed.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Provider that always fails permanently (offline runs)
#[derive(Debug, Clone)]
pub struct UnavailableProvider {
    reason: String,
}

impl UnavailableProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        UnavailableProvider {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for UnavailableProvider {
    async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Disabled(self.reason.clone()))
    }
}
