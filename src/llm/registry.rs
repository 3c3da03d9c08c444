//! Backend selection for the shared completion oracle

use super::local::ModelSource;
use super::{
    ChatTemplate, LlmError, LlmService, LocalModelService, LoggingService,
    RemoteCompletionService,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Checkpoint served when nothing else is configured
pub const DEFAULT_MODEL: &str = "Qwen/Qwen2.5-3B-Instruct";
const DEFAULT_REVISION: &str = "main";

/// Which backend answers completions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Candle inference inside this process
    Local,
    /// `OpenAI`-compatible completions endpoint
    Remote,
}

/// Configuration for the completion backend
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    /// `local` or `remote`; remote is implied by `remote_url`
    pub backend: Option<String>,
    /// Hub repo id, or model name sent to the remote endpoint
    pub model: Option<String>,
    pub revision: Option<String>,
    /// Read the checkpoint from this directory instead of the hub
    pub model_dir: Option<PathBuf>,
    pub remote_url: Option<String>,
    pub api_key: Option<String>,
    pub template: ChatTemplate,
    /// Fixed sampler seed; random per call when unset
    pub seed: Option<u64>,
    pub force_cpu: bool,
}

impl LlmConfig {
    pub fn backend(&self) -> Result<Backend, LlmError> {
        match self.backend.as_deref().map(str::trim) {
            Some("local") => Ok(Backend::Local),
            Some("remote") => Ok(Backend::Remote),
            Some(other) => Err(LlmError::load(format!(
                "Unknown backend {other:?} (expected local or remote)"
            ))),
            None if self.remote_url.is_some() => Ok(Backend::Remote),
            None => Ok(Backend::Local),
        }
    }

    pub fn model_id(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Build the process-wide oracle, wrapped with logging.
///
/// Construction is cheap; the local backend defers loading weights until
/// first use or an explicit warm-up.
pub fn build_service(config: &LlmConfig) -> Result<Arc<dyn LlmService>, LlmError> {
    let service: Arc<dyn LlmService> = match config.backend()? {
        Backend::Local => {
            let source = match &config.model_dir {
                Some(dir) => ModelSource::Directory(dir.clone()),
                None => ModelSource::Hub {
                    repo: config.model_id().to_string(),
                    revision: config
                        .revision
                        .clone()
                        .unwrap_or_else(|| DEFAULT_REVISION.to_string()),
                },
            };
            Arc::new(LocalModelService::new(
                config.model_id(),
                source,
                config.template,
                config.force_cpu,
                config.seed,
            ))
        }
        Backend::Remote => {
            let url = config.remote_url.as_deref().ok_or_else(|| {
                LlmError::load("Remote backend selected but ALIEN_CHAT_REMOTE_URL is not set")
            })?;
            Arc::new(RemoteCompletionService::new(
                url,
                config.api_key.clone(),
                config.model_id(),
                config.template.stop_tokens(),
            )?)
        }
    };

    Ok(Arc::new(LoggingService::new(service)))
}
