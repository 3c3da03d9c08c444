//! Session state

use serde::Serialize;

/// Where a session is in its request/response cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionState {
    /// Ready for input, nothing in flight
    #[default]
    Idle,

    /// A reply is being generated for `user_text`
    AwaitingResponse {
        /// Correlates the eventual result with this input
        request_id: String,
        user_text: String,
    },
}

impl SessionState {
    #[cfg(test)]
    pub fn is_awaiting(&self) -> bool {
        matches!(self, SessionState::AwaitingResponse { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingResponse { .. } => "awaiting_response",
        }
    }
}
