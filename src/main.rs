//! Alien Chat - a persona-driven chatbot served over HTTP
//!
//! Each browser session holds its own conversation; replies come from a
//! local Qwen model or an OpenAI-compatible completion endpoint.

mod api;
mod config;
mod conversation;
mod llm;
mod runtime;
mod state_machine;
mod theme;
mod view;

use api::{create_router, AppState};
use config::AppConfig;
use conversation::ResponseGenerator;
use runtime::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use theme::Theme;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alien_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = AppConfig::from_env()?;
    let backend = config.llm.backend()?;

    // Oracle and generator, shared by every session
    let oracle = llm::build_service(&config.llm)?;
    tracing::info!(
        model = %oracle.model_id(),
        backend = ?backend,
        template = %config.llm.template,
        "Completion backend configured"
    );

    if config.eager_load {
        // Load in the background so the page is reachable while weights download
        let oracle = oracle.clone();
        tokio::spawn(async move {
            if let Err(e) = oracle.warm_up().await {
                tracing::warn!(error = %e, "Warm-up failed; loading again on first message");
            }
        });
    }

    let generator = ResponseGenerator::new(oracle.clone(), config.llm.template)
        .with_timeout(config.generation_timeout);
    let sessions = Arc::new(SessionManager::new(Arc::new(generator), config.persona.clone()));
    if let Some(idle_limit) = config.session_idle_timeout {
        sessions.spawn_reaper(idle_limit);
    }
    let theme = Theme::load(&config.assets_dir, &config.persona, oracle.model_id());

    // Create application state
    let state = AppState::new(sessions, theme, backend);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Alien Chat listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
