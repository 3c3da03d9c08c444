//! Session runtime executor

use super::SseEvent;

use crate::conversation::{ConversationStore, ResponseGenerator};
use crate::state_machine::{transition, Effect, Event, SessionState, TransitionError};
use crate::view::{self, SessionView};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Event loop owning one session's conversation
pub struct SessionRuntime {
    session_id: String,
    state: SessionState,
    store: ConversationStore,
    generator: Arc<ResponseGenerator>,
    event_rx: mpsc::Receiver<Event>,
    /// Weak so the loop ends once every handle is dropped
    event_tx: mpsc::WeakSender<Event>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    view_tx: watch::Sender<SessionView>,
    /// Token to cancel the running generation
    response_cancel_token: Option<CancellationToken>,
    /// Last failure, shown until the next message or reset
    last_error: Option<String>,
}

impl SessionRuntime {
    pub fn new(
        session_id: String,
        store: ConversationStore,
        generator: Arc<ResponseGenerator>,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::WeakSender<Event>,
        broadcast_tx: broadcast::Sender<SseEvent>,
        view_tx: watch::Sender<SessionView>,
    ) -> Self {
        Self {
            session_id,
            state: SessionState::Idle,
            store,
            generator,
            event_rx,
            event_tx,
            broadcast_tx,
            view_tx,
            response_cancel_token: None,
            last_error: None,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.session_id, "Starting session runtime");

        while let Some(event) = self.event_rx.recv().await {
            if let Err(e) = self.process_event(event) {
                tracing::warn!(session_id = %self.session_id, error = %e, "Event rejected");
                let _ = self.broadcast_tx.send(SseEvent::Error {
                    message: e.to_string(),
                });
            }
        }

        if let Some(token) = self.response_cancel_token.take() {
            token.cancel();
        }
        tracing::info!(session_id = %self.session_id, "Session runtime stopped");
    }

    fn process_event(&mut self, event: Event) -> Result<(), TransitionError> {
        let result = match transition(&self.state, event) {
            Ok(result) => result,
            // The page never sends blank input; ignore it quietly if it does
            Err(TransitionError::EmptyInput) => {
                tracing::debug!(session_id = %self.session_id, "Ignoring empty message");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if result.new_state != self.state {
            tracing::debug!(
                session_id = %self.session_id,
                from = self.state.name(),
                to = result.new_state.name(),
                "State transition"
            );
        }
        self.state = result.new_state;

        for effect in result.effects {
            self.execute_effect(effect);
        }
        Ok(())
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::RequestResponse {
                request_id,
                user_text,
            } => {
                self.last_error = None;
                self.spawn_generation(request_id, user_text);
            }

            Effect::CancelResponse => {
                if let Some(token) = self.response_cancel_token.take() {
                    tracing::info!(session_id = %self.session_id, "Cancelling generation");
                    token.cancel();
                }
            }

            Effect::CommitTurn { user_text, reply } => {
                self.response_cancel_token = None;
                self.store.append_user(user_text);
                self.store.append_assistant(reply);
            }

            Effect::ResetStore => {
                self.last_error = None;
                self.store.reset();
                tracing::info!(session_id = %self.session_id, "Conversation reset");
            }

            Effect::NotifyError { message } => {
                self.response_cancel_token = None;
                self.last_error = Some(message.clone());
                let _ = self.broadcast_tx.send(SseEvent::Error { message });
            }

            Effect::Render => {
                let view = view::render(
                    &self.session_id,
                    &self.state,
                    &self.store,
                    self.last_error.as_deref(),
                );
                self.view_tx.send_replace(view.clone());
                let _ = self.broadcast_tx.send(SseEvent::Render { view });
            }
        }
    }

    /// Run the generator off the event loop and post its outcome back
    fn spawn_generation(&mut self, request_id: String, user_text: String) {
        let Some(event_tx) = self.event_tx.upgrade() else {
            tracing::debug!(session_id = %self.session_id, "Session closing, skipping generation");
            return;
        };

        let token = CancellationToken::new();
        self.response_cancel_token = Some(token.clone());

        let generator = self.generator.clone();
        let history = self.store.history().to_vec();
        let session_id = self.session_id.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                () = token.cancelled() => {
                    tracing::info!(session_id = %session_id, request_id = %request_id, "Generation cancelled");
                    return;
                }
                result = generator.generate(&history, &user_text) => result,
            };

            let event = match outcome {
                Ok((reply, _)) => Event::ResponseReady { request_id, reply },
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "Generation failed");
                    Event::ResponseFailed {
                        request_id,
                        message: e.to_string(),
                    }
                }
            };
            let _ = event_tx.send(event).await;
        });
    }
}
