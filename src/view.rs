//! Render a session into what the page displays

use crate::conversation::{ConversationStore, Role, Turn};
use crate::state_machine::SessionState;
use pulldown_cmark::{html, CowStr, Event as MdEvent, Options, Parser, Tag};
use serde::Serialize;

/// One chat bubble
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedMessage {
    pub role: Role,
    pub content: String,
    pub html: String,
}

impl RenderedMessage {
    fn from_turn(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
            html: markdown_to_html(&turn.content),
        }
    }
}

/// Snapshot of a session as the page shows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub state: &'static str,
    /// The display log, in order
    pub messages: Vec<RenderedMessage>,
    /// User text awaiting a reply; not yet part of the log
    pub pending: Option<RenderedMessage>,
    pub error: Option<String>,
}

/// Project the display log (never the history) into a view
pub fn render(
    session_id: &str,
    state: &SessionState,
    store: &ConversationStore,
    error: Option<&str>,
) -> SessionView {
    let pending = match state {
        SessionState::AwaitingResponse { user_text, .. } => {
            Some(RenderedMessage::from_turn(&Turn::user(user_text.as_str())))
        }
        SessionState::Idle => None,
    };

    SessionView {
        session_id: session_id.to_string(),
        state: state.name(),
        messages: store.log().iter().map(RenderedMessage::from_turn).collect(),
        pending,
        error: error.map(str::to_string),
    }
}

/// Link schemes a rendered message may point at
const SAFE_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Markdown to HTML. Raw HTML in the source is shown as text, and links or
/// images with any other scheme point nowhere.
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        MdEvent::Html(raw) | MdEvent::InlineHtml(raw) => MdEvent::Text(raw),
        MdEvent::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => MdEvent::Start(Tag::Link {
            link_type,
            dest_url: neutralize_url(dest_url),
            title,
            id,
        }),
        MdEvent::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => MdEvent::Start(Tag::Image {
            link_type,
            dest_url: neutralize_url(dest_url),
            title,
            id,
        }),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn neutralize_url(url: CowStr<'_>) -> CowStr<'_> {
    if is_safe_url(&url) {
        url
    } else {
        tracing::debug!(url = %url, "Dropping link with unsafe scheme");
        CowStr::Borrowed("#")
    }
}

/// Relative URLs and the allowed schemes pass
fn is_safe_url(url: &str) -> bool {
    // Browsers ignore whitespace and control characters inside a scheme
    let cleaned: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    match cleaned.split_once(':') {
        Some((scheme, _)) if !scheme.contains(['/', '?', '#']) => SAFE_SCHEMES
            .iter()
            .any(|safe| scheme.eq_ignore_ascii_case(safe)),
        _ => true,
    }
}
