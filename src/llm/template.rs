//! Chat templates: flatten role-tagged turns into one conditioning prompt

use crate::conversation::{Role, Turn};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// System text Qwen's bundled template falls back to when none is given
const QWEN_DEFAULT_SYSTEM: &str =
    "You are Qwen, created by Alibaba Cloud. You are a helpful assistant.";

/// Prompt format expected by the checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatTemplate {
    /// `<|im_start|>{role}\n{content}<|im_end|>\n` (Qwen2.x)
    #[default]
    ChatMl,
    /// `<|start_header_id|>{role}<|end_header_id|>\n\n{content}<|eot_id|>`
    Llama3,
}

impl ChatTemplate {
    /// Render `turns` and leave an open assistant turn at the end
    pub fn render(self, turns: &[Turn]) -> String {
        match self {
            ChatTemplate::ChatMl => render_chatml(turns),
            ChatTemplate::Llama3 => render_llama3(turns),
        }
    }

    /// Tokens that end an assistant turn
    pub fn stop_tokens(self) -> &'static [&'static str] {
        match self {
            ChatTemplate::ChatMl => &["<|im_end|>", "<|endoftext|>"],
            ChatTemplate::Llama3 => &["<|eot_id|>", "<|end_of_text|>"],
        }
    }
}

impl FromStr for ChatTemplate {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chatml" | "qwen" => Ok(ChatTemplate::ChatMl),
            "llama3" | "llama-3" => Ok(ChatTemplate::Llama3),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ChatTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatTemplate::ChatMl => f.write_str("chatml"),
            ChatTemplate::Llama3 => f.write_str("llama3"),
        }
    }
}

fn render_chatml(turns: &[Turn]) -> String {
    let mut prompt = String::new();
    if turns.first().map(|t| t.role) != Some(Role::System) {
        push_chatml(&mut prompt, Role::System, QWEN_DEFAULT_SYSTEM);
    }
    for turn in turns {
        push_chatml(&mut prompt, turn.role, &turn.content);
    }
    prompt.push_str("<|im_start|>assistant\n");
    prompt
}

fn push_chatml(prompt: &mut String, role: Role, content: &str) {
    prompt.push_str("<|im_start|>");
    prompt.push_str(role.as_str());
    prompt.push('\n');
    prompt.push_str(content);
    prompt.push_str("<|im_end|>\n");
}

fn render_llama3(turns: &[Turn]) -> String {
    let mut prompt = String::from("<|begin_of_text|>");
    for turn in turns {
        prompt.push_str("<|start_header_id|>");
        prompt.push_str(turn.role.as_str());
        prompt.push_str("<|end_header_id|>\n\n");
        prompt.push_str(&turn.content);
        prompt.push_str("<|eot_id|>");
    }
    prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
    prompt
}
