//! API request and response types

use crate::llm::{Backend, ChatTemplate, SamplingConfig};
use crate::view::SessionView;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Response with a single session
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub view: SessionView,
}

/// Response for chat action
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub queued: bool,
    /// Correlates the eventual reply; absent when nothing was queued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Response for reset and close actions
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// Model info
#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub model_id: String,
    pub backend: Backend,
    pub template: ChatTemplate,
    pub sampling: SamplingConfig,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
