//! Session runtimes
//!
//! Each browser session gets its own event loop task that exclusively owns
//! that session's conversation store. The manager only routes events and
//! subscriptions to it.

mod executor;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;

use crate::conversation::{ConversationStore, ResponseGenerator};
use crate::state_machine::{Event, SessionState};
use crate::view::{self, SessionView};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch, RwLock};

/// Session lookup failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Session {0} has shut down")]
    Closed(String),
}

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SseEvent {
    Init { view: SessionView },
    Render { view: SessionView },
    Error { message: String },
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub event_tx: mpsc::Sender<Event>,
    pub broadcast_tx: broadcast::Sender<SseEvent>,
    /// Latest published view
    pub view_rx: watch::Receiver<SessionView>,
    pub created_at: DateTime<Utc>,
    last_active: Arc<Mutex<Instant>>,
}

impl SessionHandle {
    fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    fn has_subscribers(&self) -> bool {
        self.broadcast_tx.receiver_count() > 0
    }
}

/// What an SSE client needs to follow a session
pub struct Subscription {
    /// View at the moment of subscribing
    pub view: SessionView,
    pub events: broadcast::Receiver<SseEvent>,
    /// Latest view, for catching up after missed events
    pub latest: watch::Receiver<SessionView>,
}

/// Manager for all session runtimes
pub struct SessionManager {
    generator: Arc<ResponseGenerator>,
    persona: String,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionManager {
    pub fn new(generator: Arc<ResponseGenerator>, persona: impl Into<String>) -> Self {
        Self {
            generator,
            persona: persona.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new session and return its id and initial view
    pub async fn create(&self) -> (String, SessionView) {
        let session_id = uuid::Uuid::new_v4().to_string();

        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, _) = broadcast::channel(128);

        let store = ConversationStore::new(self.persona.clone());
        let initial = view::render(&session_id, &SessionState::Idle, &store, None);
        let (view_tx, view_rx) = watch::channel(initial.clone());

        let runtime = SessionRuntime::new(
            session_id.clone(),
            store,
            self.generator.clone(),
            event_rx,
            event_tx.downgrade(),
            broadcast_tx.clone(),
            view_tx,
        );

        let id = session_id.clone();
        tokio::spawn(async move {
            runtime.run().await;
            tracing::info!(session_id = %id, "Session runtime finished");
        });

        self.sessions.write().await.insert(
            session_id.clone(),
            SessionHandle {
                event_tx,
                broadcast_tx,
                view_rx,
                created_at: Utc::now(),
                last_active: Arc::new(Mutex::new(Instant::now())),
            },
        );

        tracing::info!(session_id = %session_id, "Session created");
        (session_id, initial)
    }

    /// Get the handle of a live session. Counts as activity.
    pub async fn get(&self, session_id: &str) -> Result<SessionHandle, SessionError> {
        let handle = self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        handle.touch();
        Ok(handle)
    }

    /// Send an event to a session
    pub async fn send_event(&self, session_id: &str, event: Event) -> Result<(), SessionError> {
        let handle = self.get(session_id).await?;
        handle
            .event_tx
            .send(event)
            .await
            .map_err(|_| SessionError::Closed(session_id.to_string()))
    }

    /// Current view of a session
    #[cfg(test)]
    pub async fn view(&self, session_id: &str) -> Result<SessionView, SessionError> {
        let handle = self.get(session_id).await?;
        let view = handle.view_rx.borrow().clone();
        Ok(view)
    }

    /// Subscribe to session updates, starting from the current view
    pub async fn subscribe(&self, session_id: &str) -> Result<Subscription, SessionError> {
        let handle = self.get(session_id).await?;
        // Subscribe before reading the snapshot so no render falls in between
        let events = handle.broadcast_tx.subscribe();
        let view = handle.view_rx.borrow().clone();
        Ok(Subscription {
            view,
            events,
            latest: handle.view_rx,
        })
    }

    /// End a session. Its runtime stops once any in-flight reply settles.
    pub async fn close(&self, session_id: &str) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .remove(session_id)
            .map(|_| tracing::info!(session_id = %session_id, "Session closed"))
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Close sessions with no stream attached that nobody has used for
    /// `idle_limit`. Returns how many were removed.
    pub async fn reap_idle(&self, idle_limit: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|session_id, handle| {
            if handle.has_subscribers() {
                handle.touch();
                return true;
            }
            let idle = handle.idle_for();
            if idle < idle_limit {
                return true;
            }
            tracing::info!(
                session_id = %session_id,
                idle_secs = idle.as_secs(),
                "Reaping abandoned session"
            );
            false
        });
        before - sessions.len()
    }

    /// Periodically reap abandoned sessions until the manager is dropped
    pub fn spawn_reaper(self: &Arc<Self>, idle_limit: Duration) -> tokio::task::JoinHandle<()> {
        // Weak reference so the task never keeps the manager alive
        let manager_weak: Weak<Self> = Arc::downgrade(self);
        let period = (idle_limit / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let Some(manager) = manager_weak.upgrade() else {
                    tracing::debug!("SessionManager dropped, reaper exiting");
                    break;
                };
                let reaped = manager.reap_idle(idle_limit).await;
                if reaped > 0 {
                    tracing::debug!(reaped, "Idle sessions reaped");
                }
            }
        })
    }

    #[cfg(test)]
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub fn generator(&self) -> &Arc<ResponseGenerator> {
        &self.generator
    }
}
