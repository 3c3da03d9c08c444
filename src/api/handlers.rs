//! HTTP request handlers

use super::assets::{get_index_html, serve_static};
use super::sse::sse_stream;
use super::types::{ChatRequest, ChatResponse, ErrorResponse, ModelInfoResponse, OkResponse, SessionResponse};
use super::AppState;
use crate::runtime::SessionError;
use crate::state_machine::Event;
use crate::theme::Theme;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Root serves the page
        .route("/", get(serve_page))
        // Static assets
        .route("/assets/*path", get(serve_static))
        // Branding and model info
        .route("/api/theme", get(get_theme))
        .route("/api/model", get(get_model))
        // Session lifecycle
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/stream", get(stream_session))
        .route("/api/sessions/:id/close", post(close_session))
        // User actions
        .route("/api/sessions/:id/chat", post(send_chat))
        .route("/api/sessions/:id/reset", post(reset_session))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Page
// ============================================================

async fn serve_page() -> impl IntoResponse {
    match get_index_html() {
        Some(content) => Html(content).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Html("<h1>404 - UI not found</h1>".to_string()),
        )
            .into_response(),
    }
}

async fn get_theme(State(state): State<AppState>) -> Json<Theme> {
    Json(state.theme.as_ref().clone())
}

async fn get_model(State(state): State<AppState>) -> Json<ModelInfoResponse> {
    let generator = state.sessions.generator();
    Json(ModelInfoResponse {
        model_id: generator.model_id().to_string(),
        backend: state.backend,
        template: generator.template(),
        sampling: generator.sampling().clone(),
    })
}

// ============================================================
// Sessions
// ============================================================

async fn create_session(State(state): State<AppState>) -> Result<Json<SessionResponse>, AppError> {
    let (session_id, view) = state.sessions.create().await;
    let handle = state.sessions.get(&session_id).await?;

    Ok(Json(SessionResponse {
        session_id,
        created_at: handle.created_at,
        view,
    }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let handle = state.sessions.get(&id).await?;
    let view = handle.view_rx.borrow().clone();

    Ok(Json(SessionResponse {
        session_id: id,
        created_at: handle.created_at,
        view,
    }))
}

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let subscription = state.sessions.subscribe(&id).await?;
    tracing::debug!(session_id = %id, "SSE client connected");

    Ok(sse_stream(subscription))
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, AppError> {
    state.sessions.close(&id).await?;
    Ok(Json(OkResponse { ok: true }))
}

// ============================================================
// User Actions
// ============================================================

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = payload?;

    // Blank submissions change nothing, not even a render
    if req.text.trim().is_empty() {
        state.sessions.get(&id).await?;
        return Ok(Json(ChatResponse {
            queued: false,
            request_id: None,
        }));
    }

    let request_id = uuid::Uuid::new_v4().to_string();
    let event = Event::UserMessage {
        request_id: request_id.clone(),
        text: req.text,
    };
    state.sessions.send_event(&id, event).await?;

    Ok(Json(ChatResponse {
        queued: true,
        request_id: Some(request_id),
    }))
}

async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, AppError> {
    state.sessions.send_event(&id, Event::Reset).await?;
    Ok(Json(OkResponse { ok: true }))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("alien-chat ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) => AppError::NotFound(e.to_string()),
            SessionError::Closed(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
