//! Page branding: banner, footer, and optional inlined images

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::path::Path;

pub const TITLE: &str = "Alien Chatbot";
pub const PLACEHOLDER: &str = "Send signal...";
const LOGO_FILE: &str = "1.png";
const BACKGROUND_FILE: &str = "2.jpg";

#[derive(Debug, Clone, Serialize)]
pub struct Theme {
    pub title: String,
    pub persona: String,
    pub footer: String,
    pub placeholder: String,
    /// `data:` URI, absent when the file is missing
    pub logo: Option<String>,
    pub background: Option<String>,
}

impl Theme {
    /// Build the theme, inlining images found in `assets_dir`
    pub fn load(assets_dir: &Path, persona: &str, model_id: &str) -> Self {
        Self {
            title: TITLE.to_string(),
            persona: persona.to_string(),
            footer: footer(model_id),
            placeholder: PLACEHOLDER.to_string(),
            logo: data_uri(&assets_dir.join(LOGO_FILE)),
            background: data_uri(&assets_dir.join(BACKGROUND_FILE)),
        }
    }
}

pub fn footer(model_id: &str) -> String {
    format!("Design by Samura Rahman | Powered by {model_id}")
}

/// Read a file into a base64 data URI. Missing or unreadable files are skipped.
fn data_uri(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            tracing::debug!(path = %path.display(), bytes = bytes.len(), "Inlined theme image");
            Some(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Theme image unavailable");
            None
        }
    }
}
