//! Effects produced by state transitions

/// Effects to be executed after a state transition, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Start generating a reply to `user_text` off the event loop
    RequestResponse {
        request_id: String,
        user_text: String,
    },

    /// Abort the in-flight generation; its result, if any, is dropped
    CancelResponse,

    /// Append the completed exchange to the conversation store
    CommitTurn { user_text: String, reply: String },

    /// Reseed the conversation store
    ResetStore,

    /// Show an error to the session's viewers
    NotifyError { message: String },

    /// Publish a fresh view of the session
    Render,
}

impl Effect {
    pub fn request_response(request_id: impl Into<String>, user_text: impl Into<String>) -> Self {
        Effect::RequestResponse {
            request_id: request_id.into(),
            user_text: user_text.into(),
        }
    }

    pub fn commit_turn(user_text: impl Into<String>, reply: impl Into<String>) -> Self {
        Effect::CommitTurn {
            user_text: user_text.into(),
            reply: reply.into(),
        }
    }

    pub fn notify_error(message: impl Into<String>) -> Self {
        Effect::NotifyError {
            message: message.into(),
        }
    }
}
