//! Response generation: one user utterance in, one assistant reply out

use super::{ConversationHistory, Turn};
use crate::llm::{ChatTemplate, LlmError, LlmService, SamplingConfig};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

/// Why a turn produced no reply
#[derive(Debug, Clone, Error)]
pub enum GenerateError {
    #[error("Message is empty")]
    EmptyInput,
    #[error("Conversation history is empty")]
    EmptyHistory,
    #[error("Model unavailable: {0}")]
    OracleUnavailable(#[from] LlmError),
}

/// Renders the conversation, asks the oracle, trims the continuation.
///
/// Holds no conversation state; the same generator serves every session.
pub struct ResponseGenerator {
    oracle: Arc<dyn LlmService>,
    template: ChatTemplate,
    sampling: SamplingConfig,
    timeout: Option<Duration>,
}

impl ResponseGenerator {
    pub fn new(oracle: Arc<dyn LlmService>, template: ChatTemplate) -> Self {
        Self {
            oracle,
            template,
            sampling: SamplingConfig::chat(),
            timeout: None,
        }
    }

    /// Fail a turn whose oracle call runs longer than `limit`
    pub fn with_timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }

    pub fn model_id(&self) -> &str {
        self.oracle.model_id()
    }

    pub fn template(&self) -> ChatTemplate {
        self.template
    }

    pub fn sampling(&self) -> &SamplingConfig {
        &self.sampling
    }

    /// Produce the assistant reply to `user_text`.
    ///
    /// `history` is never modified; the returned history is a copy with the
    /// user turn and the reply appended. On error nothing is returned, so a
    /// failed turn cannot leak into the caller's state.
    pub async fn generate(
        &self,
        history: &[Turn],
        user_text: &str,
    ) -> Result<(String, ConversationHistory), GenerateError> {
        if user_text.trim().is_empty() {
            return Err(GenerateError::EmptyInput);
        }
        if history.is_empty() {
            return Err(GenerateError::EmptyHistory);
        }

        let mut working: ConversationHistory = history.to_vec();
        working.push(Turn::user(user_text));

        let prompt = self.template.render(&working);
        tracing::debug!(turns = working.len(), prompt_chars = prompt.len(), "Requesting reply");

        let request = self.oracle.complete(&prompt, &self.sampling);
        let completion = match self.timeout {
            Some(limit) => timeout(limit, request).await.map_err(|_| {
                LlmError::timeout(format!("No reply within {}s", limit.as_secs()))
            })??,
            None => request.await?,
        };

        let reply = completion.text.trim().to_string();
        working.push(Turn::assistant(reply.clone()));
        Ok((reply, working))
    }
}
