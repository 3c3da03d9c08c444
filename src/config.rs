//! Process configuration read from the environment
//!
//! Everything is read once at startup; unset variables fall back to the
//! defaults the chat page was designed around.

use crate::llm::{ChatTemplate, LlmConfig};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Persona seeded as the system turn of every conversation
pub const DEFAULT_PERSONA: &str = "You are a helpful alien assistant exploring the cosmos.";

const DEFAULT_PORT: u16 = 8000;

/// Sessions with no open stream are closed after this long unused
const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);

/// Invalid configuration value
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: expected {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub persona: String,
    /// Directory holding the optional logo and background images
    pub assets_dir: PathBuf,
    /// Load the model at startup instead of on the first message
    pub eager_load: bool,
    pub generation_timeout: Option<Duration>,
    /// `None` keeps abandoned sessions forever
    pub session_idle_timeout: Option<Duration>,
    pub llm: LlmConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("ALIEN_CHAT_PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                var: "ALIEN_CHAT_PORT",
                expected: "a port number",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let persona = lookup("ALIEN_CHAT_PERSONA")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PERSONA.to_string());

        let eager_load = match lookup("ALIEN_CHAT_EAGER_LOAD") {
            Some(value) => parse_bool("ALIEN_CHAT_EAGER_LOAD", value)?,
            None => true,
        };

        let generation_timeout = match lookup("ALIEN_CHAT_GENERATION_TIMEOUT_SECS") {
            Some(value) => parse_secs("ALIEN_CHAT_GENERATION_TIMEOUT_SECS", value)?,
            None => None,
        };

        let session_idle_timeout = match lookup("ALIEN_CHAT_SESSION_IDLE_SECS") {
            Some(value) => parse_secs("ALIEN_CHAT_SESSION_IDLE_SECS", value)?,
            None => Some(DEFAULT_SESSION_IDLE),
        };

        let template = match lookup("ALIEN_CHAT_TEMPLATE") {
            Some(value) => value.parse().map_err(|()| ConfigError::Invalid {
                var: "ALIEN_CHAT_TEMPLATE",
                expected: "chatml or llama3",
                value,
            })?,
            None => ChatTemplate::default(),
        };

        let seed = match lookup("ALIEN_CHAT_SEED") {
            Some(value) => Some(value.parse().map_err(|_| ConfigError::Invalid {
                var: "ALIEN_CHAT_SEED",
                expected: "an unsigned integer",
                value,
            })?),
            None => None,
        };

        let force_cpu = match lookup("ALIEN_CHAT_CPU") {
            Some(value) => parse_bool("ALIEN_CHAT_CPU", value)?,
            None => false,
        };

        let llm = LlmConfig {
            backend: lookup("ALIEN_CHAT_BACKEND"),
            model: lookup("ALIEN_CHAT_MODEL"),
            revision: lookup("ALIEN_CHAT_REVISION"),
            model_dir: lookup("ALIEN_CHAT_MODEL_DIR").map(PathBuf::from),
            remote_url: lookup("ALIEN_CHAT_REMOTE_URL"),
            api_key: lookup("ALIEN_CHAT_API_KEY"),
            template,
            seed,
            force_cpu,
        };

        Ok(Self {
            port,
            persona,
            assets_dir: lookup("ALIEN_CHAT_ASSETS_DIR").map_or_else(|| PathBuf::from("."), PathBuf::from),
            eager_load,
            generation_timeout,
            session_idle_timeout,
            llm,
        })
    }
}

/// Whole seconds; 0 turns the limit off
fn parse_secs(var: &'static str, value: String) -> Result<Option<Duration>, ConfigError> {
    let secs: u64 = value.parse().map_err(|_| ConfigError::Invalid {
        var,
        expected: "a number of seconds",
        value,
    })?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            expected: "a boolean",
            value,
        }),
    }
}
