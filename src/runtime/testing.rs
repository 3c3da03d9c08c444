//! Mock implementations for testing
//!
//! These mocks enable end-to-end session tests without loading a model.

use crate::llm::{Completion, LlmError, LlmService, SamplingConfig};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Mock LLM Service
// ============================================================================

enum ReplyMode {
    /// Same text every call
    Fixed(String),
    /// `prefix` followed by the 1-based call number
    Counting(String),
    /// Only what was queued
    Queued,
}

/// Mock completion backend with scripted replies
pub struct MockLlmService {
    mode: ReplyMode,
    queued: Mutex<VecDeque<Result<Completion, LlmError>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    /// Record of all prompts received
    prompts: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockLlmService {
    fn with_mode(mode: ReplyMode) -> Self {
        Self {
            mode,
            queued: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Replies only with queued results; fails once the queue is empty
    pub fn new() -> Self {
        Self::with_mode(ReplyMode::Queued)
    }

    pub fn fixed(text: impl Into<String>) -> Self {
        Self::with_mode(ReplyMode::Fixed(text.into()))
    }

    pub fn counting(prefix: impl Into<String>) -> Self {
        Self::with_mode(ReplyMode::Counting(prefix.into()))
    }

    /// Sleep before answering, to keep a request in flight
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful reply. Queued results take precedence over the mode.
    pub fn queue_reply(&self, text: impl Into<String>) {
        self.queued
            .lock()
            .unwrap()
            .push_back(Ok(Completion::text(text)));
    }

    /// Queue an error
    pub fn queue_error(&self, error: LlmError) {
        self.queued.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded prompts
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockLlmService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(
        &self,
        prompt: &str,
        _sampling: &SamplingConfig,
    ) -> Result<Completion, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(result) = self.queued.lock().unwrap().pop_front() {
            return result;
        }
        match &self.mode {
            ReplyMode::Fixed(text) => Ok(Completion::text(text.clone())),
            ReplyMode::Counting(prefix) => Ok(Completion::text(format!("{prefix}{call}"))),
            ReplyMode::Queued => Err(LlmError::network("No mock response queued")),
        }
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Session runtime tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ResponseGenerator, Role};
    use crate::llm::ChatTemplate;
    use crate::runtime::{SessionError, SessionManager, SseEvent};
    use crate::state_machine::Event;
    use crate::view::SessionView;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    const PERSONA: &str = "You are a helpful alien assistant exploring the cosmos.";

    fn manager(mock: &Arc<MockLlmService>) -> SessionManager {
        let generator = ResponseGenerator::new(mock.clone(), ChatTemplate::ChatMl);
        SessionManager::new(Arc::new(generator), PERSONA)
    }

    fn user_message(request_id: &str, text: &str) -> Event {
        Event::UserMessage {
            request_id: request_id.to_string(),
            text: text.to_string(),
        }
    }

    /// Wait for the next render matching `pred`
    async fn wait_for_view(
        rx: &mut broadcast::Receiver<SseEvent>,
        pred: impl Fn(&SessionView) -> bool,
    ) -> SessionView {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(SseEvent::Render { view }) if pred(&view) => return view,
                    Ok(_) => {}
                    Err(e) => panic!("event stream closed: {e}"),
                }
            }
        })
        .await
        .expect("timed out waiting for render")
    }

    /// Wait for the next error event
    async fn wait_for_error(rx: &mut broadcast::Receiver<SseEvent>) -> String {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(SseEvent::Error { message }) => return message,
                    Ok(_) => {}
                    Err(e) => panic!("event stream closed: {e}"),
                }
            }
        })
        .await
        .expect("timed out waiting for error")
    }

    fn contents(view: &SessionView) -> Vec<(Role, &str)> {
        view.messages
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect()
    }

    #[tokio::test]
    async fn test_mock_llm_service() {
        let mock = MockLlmService::new();
        mock.queue_reply("Hello");
        let sampling = SamplingConfig::chat();

        let completion = mock.complete("prompt", &sampling).await.unwrap();
        assert_eq!(completion.text, "Hello");

        // Nothing left in the queue
        assert!(mock.complete("prompt", &sampling).await.is_err());
        assert_eq!(mock.recorded_prompts(), vec!["prompt", "prompt"]);
    }

    #[tokio::test]
    async fn test_counting_mock() {
        let mock = MockLlmService::counting("reply-");
        let sampling = SamplingConfig::chat();
        assert_eq!(mock.complete("a", &sampling).await.unwrap().text, "reply-1");
        assert_eq!(mock.complete("b", &sampling).await.unwrap().text, "reply-2");
    }

    #[tokio::test]
    async fn test_new_session_starts_empty() {
        let mock = Arc::new(MockLlmService::fixed("unused"));
        let manager = manager(&mock);

        let (id, view) = manager.create().await;

        assert_eq!(view.session_id, id);
        assert_eq!(view.state, "idle");
        assert!(view.messages.is_empty());
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_single_turn_end_to_end() {
        let mock = Arc::new(MockLlmService::fixed("Greetings, Earthling."));
        let manager = manager(&mock);
        let (id, _) = manager.create().await;
        let mut rx = manager.subscribe(&id).await.unwrap().events;

        manager.send_event(&id, user_message("r1", "Hello")).await.unwrap();

        let awaiting = wait_for_view(&mut rx, |v| v.state == "awaiting_response").await;
        assert_eq!(awaiting.pending.unwrap().content, "Hello");

        let view = wait_for_view(&mut rx, |v| v.state == "idle").await;
        assert_eq!(
            contents(&view),
            vec![
                (Role::User, "Hello"),
                (Role::Assistant, "Greetings, Earthling.")
            ]
        );
        assert_eq!(manager.view(&id).await.unwrap(), view);
    }

    #[tokio::test]
    async fn test_two_turns_then_reset() {
        let mock = Arc::new(MockLlmService::counting("reply-"));
        let manager = manager(&mock);
        let (id, _) = manager.create().await;
        let mut rx = manager.subscribe(&id).await.unwrap().events;

        manager.send_event(&id, user_message("r1", "A")).await.unwrap();
        wait_for_view(&mut rx, |v| v.state == "idle").await;
        manager.send_event(&id, user_message("r2", "B")).await.unwrap();
        let view = wait_for_view(&mut rx, |v| v.state == "idle").await;

        assert_eq!(
            contents(&view),
            vec![
                (Role::User, "A"),
                (Role::Assistant, "reply-1"),
                (Role::User, "B"),
                (Role::Assistant, "reply-2"),
            ]
        );

        manager.send_event(&id, Event::Reset).await.unwrap();
        let view = wait_for_view(&mut rx, |_| true).await;
        assert!(view.messages.is_empty());

        // The next prompt is conditioned on the persona alone
        manager.send_event(&id, user_message("r3", "C")).await.unwrap();
        wait_for_view(&mut rx, |v| v.state == "idle").await;
        let last_prompt = mock.recorded_prompts().pop().unwrap();
        assert!(last_prompt.contains(PERSONA));
        assert!(!last_prompt.contains("reply-1"));
    }

    #[tokio::test]
    async fn test_oracle_failure_keeps_session_usable() {
        let mock = Arc::new(MockLlmService::new());
        mock.queue_error(LlmError::load("weights missing"));
        mock.queue_reply("Back online.");
        let manager = manager(&mock);
        let (id, _) = manager.create().await;
        let mut rx = manager.subscribe(&id).await.unwrap().events;

        manager.send_event(&id, user_message("r1", "Hello")).await.unwrap();

        let message = wait_for_error(&mut rx).await;
        assert!(message.contains("weights missing"));
        let view = wait_for_view(&mut rx, |v| v.state == "idle").await;
        assert!(view.messages.is_empty());
        assert!(view.error.is_some());

        // Retried on the next message
        manager.send_event(&id, user_message("r2", "Hello")).await.unwrap();
        let view = wait_for_view(&mut rx, |v| v.state == "idle").await;
        assert_eq!(
            contents(&view),
            vec![(Role::User, "Hello"), (Role::Assistant, "Back online.")]
        );
        assert!(view.error.is_none());
    }

    #[tokio::test]
    async fn test_message_while_busy_is_rejected() {
        let mock = Arc::new(
            MockLlmService::counting("reply-").with_delay(Duration::from_millis(200)),
        );
        let manager = manager(&mock);
        let (id, _) = manager.create().await;
        let mut rx = manager.subscribe(&id).await.unwrap().events;

        manager.send_event(&id, user_message("r1", "A")).await.unwrap();
        manager.send_event(&id, user_message("r2", "B")).await.unwrap();

        let message = wait_for_error(&mut rx).await;
        assert!(message.contains("previous message"));

        let view = wait_for_view(&mut rx, |v| v.state == "idle").await;
        assert_eq!(
            contents(&view),
            vec![(Role::User, "A"), (Role::Assistant, "reply-1")]
        );
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_reset_during_generation_discards_reply() {
        let mock = Arc::new(
            MockLlmService::fixed("too late").with_delay(Duration::from_millis(200)),
        );
        let manager = manager(&mock);
        let (id, _) = manager.create().await;
        let mut rx = manager.subscribe(&id).await.unwrap().events;

        manager.send_event(&id, user_message("r1", "Hello")).await.unwrap();
        wait_for_view(&mut rx, |v| v.state == "awaiting_response").await;

        manager.send_event(&id, Event::Reset).await.unwrap();
        let view = wait_for_view(&mut rx, |v| v.state == "idle").await;
        assert!(view.messages.is_empty());
        assert!(view.pending.is_none());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let view = manager.view(&id).await.unwrap();
        assert!(view.messages.is_empty());
        assert_eq!(view.state, "idle");
    }

    #[tokio::test]
    async fn test_stale_and_empty_events_ignored() {
        let mock = Arc::new(MockLlmService::fixed("Greetings."));
        let manager = manager(&mock);
        let (id, _) = manager.create().await;
        let mut rx = manager.subscribe(&id).await.unwrap().events;

        manager
            .send_event(
                &id,
                Event::ResponseReady {
                    request_id: "stale".to_string(),
                    reply: "ghost".to_string(),
                },
            )
            .await
            .unwrap();
        manager.send_event(&id, user_message("r1", "   ")).await.unwrap();
        manager.send_event(&id, user_message("r2", "Hello")).await.unwrap();

        let view = wait_for_view(&mut rx, |v| v.state == "idle").await;
        assert_eq!(
            contents(&view),
            vec![(Role::User, "Hello"), (Role::Assistant, "Greetings.")]
        );
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let mock = Arc::new(MockLlmService::fixed("ok"));
        let manager = manager(&mock);
        let (first, _) = manager.create().await;
        let (second, _) = manager.create().await;
        let mut rx = manager.subscribe(&first).await.unwrap().events;

        manager.send_event(&first, user_message("r1", "Hi")).await.unwrap();
        wait_for_view(&mut rx, |v| v.state == "idle").await;

        assert_eq!(manager.view(&first).await.unwrap().messages.len(), 2);
        assert!(manager.view(&second).await.unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_close_session() {
        let mock = Arc::new(MockLlmService::fixed("ok"));
        let manager = manager(&mock);
        let (id, _) = manager.create().await;

        manager.close(&id).await.unwrap();

        assert!(matches!(manager.get(&id).await, Err(SessionError::NotFound(_))));
        assert!(matches!(manager.close(&id).await, Err(SessionError::NotFound(_))));
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_abandoned_session_is_reaped() {
        let mock = Arc::new(MockLlmService::fixed("ok"));
        let manager = manager(&mock);
        let (abandoned, _) = manager.create().await;
        let (active, _) = manager.create().await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        manager.get(&active).await.unwrap();

        assert_eq!(manager.reap_idle(Duration::from_millis(40)).await, 1);
        assert!(matches!(manager.get(&abandoned).await, Err(SessionError::NotFound(_))));
        assert!(manager.get(&active).await.is_ok());
    }

    #[tokio::test]
    async fn test_streaming_session_is_not_reaped() {
        let mock = Arc::new(MockLlmService::fixed("ok"));
        let manager = manager(&mock);
        let (id, _) = manager.create().await;
        let subscription = manager.subscribe(&id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(manager.reap_idle(Duration::from_millis(40)).await, 0);

        // Once the page goes away the session ages out
        drop(subscription);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(manager.reap_idle(Duration::from_millis(40)).await, 1);
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_reaper_task_closes_abandoned_sessions() {
        let mock = Arc::new(MockLlmService::fixed("ok"));
        let manager = Arc::new(manager(&mock));
        manager.create().await;

        let reaper = manager.spawn_reaper(Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.session_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("abandoned session was never reaped");

        // The reaper only holds a weak reference
        drop(manager);
        tokio::time::timeout(Duration::from_secs(5), reaper)
            .await
            .expect("reaper outlived its manager")
            .unwrap();
    }
}
