//! Pure state transition function

use super::{Effect, Event, SessionState};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Events the current state refuses
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Message is empty")]
    EmptyInput,
    #[error("Still answering the previous message")]
    Busy,
}

/// Pure transition function.
///
/// Given the same inputs it always produces the same outputs, with no I/O.
pub fn transition(state: &SessionState, event: Event) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // Blank input is ignored in every state
        (_, Event::UserMessage { text, .. }) if text.trim().is_empty() => {
            Err(TransitionError::EmptyInput)
        }

        // Idle + UserMessage -> AwaitingResponse
        (SessionState::Idle, Event::UserMessage { request_id, text }) => Ok(TransitionResult::new(
            SessionState::AwaitingResponse {
                request_id: request_id.clone(),
                user_text: text.clone(),
            },
        )
        .with_effect(Effect::request_response(request_id, text))
        .with_effect(Effect::Render)),

        // One generation in flight per session
        (SessionState::AwaitingResponse { .. }, Event::UserMessage { .. }) => {
            Err(TransitionError::Busy)
        }

        // AwaitingResponse + matching ResponseReady -> Idle, exchange committed
        (
            SessionState::AwaitingResponse {
                request_id,
                user_text,
            },
            Event::ResponseReady {
                request_id: answered,
                reply,
            },
        ) if *request_id == answered => Ok(TransitionResult::new(SessionState::Idle)
            .with_effect(Effect::commit_turn(user_text.clone(), reply))
            .with_effect(Effect::Render)),

        // AwaitingResponse + matching ResponseFailed -> Idle, nothing committed
        (
            SessionState::AwaitingResponse { request_id, .. },
            Event::ResponseFailed {
                request_id: answered,
                message,
            },
        ) if *request_id == answered => Ok(TransitionResult::new(SessionState::Idle)
            .with_effect(Effect::notify_error(message))
            .with_effect(Effect::Render)),

        // Results for a request that was reset away or superseded
        (_, Event::ResponseReady { .. } | Event::ResponseFailed { .. }) => {
            Ok(TransitionResult::new(state.clone()))
        }

        (SessionState::Idle, Event::Reset) => Ok(TransitionResult::new(SessionState::Idle)
            .with_effect(Effect::ResetStore)
            .with_effect(Effect::Render)),

        // Reset mid-generation cancels it; a late result is discarded above
        (SessionState::AwaitingResponse { .. }, Event::Reset) => {
            Ok(TransitionResult::new(SessionState::Idle)
                .with_effect(Effect::CancelResponse)
                .with_effect(Effect::ResetStore)
                .with_effect(Effect::Render))
        }
    }
}
