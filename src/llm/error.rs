//! Oracle error types

use thiserror::Error;

/// Oracle error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn load(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Load, message)
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Inference, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::InvalidRequest, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Timeout, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unknown, message)
    }
}

/// Where the oracle failed. Every kind leaves the session usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Weights, tokenizer or config could not be fetched or parsed
    Load,
    /// The model was loaded but a forward pass or decode failed
    Inference,
    /// Remote endpoint unreachable
    Network,
    /// Remote endpoint returned 5xx
    ServerError,
    /// Remote endpoint rejected credentials (401, 403)
    Auth,
    /// Remote endpoint rejected the request (400)
    InvalidRequest,
    /// No continuation within the configured deadline
    Timeout,
    Unknown,
}
