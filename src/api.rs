//! HTTP API and page serving

mod assets;
mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::llm::Backend;
use crate::runtime::SessionManager;
use crate::theme::Theme;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub theme: Arc<Theme>,
    pub backend: Backend,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>, theme: Theme, backend: Backend) -> Self {
        Self {
            sessions,
            theme: Arc::new(theme),
            backend,
        }
    }
}
