//! Text-completion oracle abstraction
//!
//! The chat core only needs "prompt in, continuation out". Backends hide
//! whether that happens on local weights or behind an HTTP endpoint.

mod error;
mod local;
mod registry;
mod remote;
mod template;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use local::LocalModelService;
pub use registry::{build_service, Backend, LlmConfig, DEFAULT_MODEL};
pub use remote::RemoteCompletionService;
pub use template::ChatTemplate;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for completion backends
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Continue `prompt` under the given sampling configuration
    async fn complete(&self, prompt: &str, sampling: &SamplingConfig)
        -> Result<Completion, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;

    /// Prepare the backend ahead of the first request.
    ///
    /// Backends with nothing to prepare succeed immediately.
    async fn warm_up(&self) -> Result<(), LlmError> {
        Ok(())
    }
}

/// Logging wrapper for completion backends
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(
        &self,
        prompt: &str,
        sampling: &SamplingConfig,
    ) -> Result<Completion, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(prompt, sampling).await;
        let duration = start.elapsed();

        match &result {
            Ok(completion) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    prompt_tokens = completion.usage.prompt_tokens,
                    completion_tokens = completion.usage.completion_tokens,
                    finish = ?completion.finish_reason,
                    "Completion finished"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = ?e.kind,
                    "Completion failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn warm_up(&self) -> Result<(), LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.warm_up().await;
        match &result {
            Ok(()) => tracing::info!(
                model = %self.model_id,
                duration_ms = %start.elapsed().as_millis(),
                "Model ready"
            ),
            Err(e) => tracing::error!(
                model = %self.model_id,
                error = %e.message,
                "Model warm-up failed"
            ),
        }
        result
    }
}
