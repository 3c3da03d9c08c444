//! Common types for completion requests

use serde::Serialize;

/// Sampling parameters for one completion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplingConfig {
    pub max_new_tokens: usize,
    /// Stochastic sampling; greedy decoding when false
    pub do_sample: bool,
    pub temperature: f64,
    /// Nucleus mass
    pub top_p: f64,
    pub repetition_penalty: f32,
}

impl SamplingConfig {
    /// The fixed configuration every chat turn is generated with
    pub const fn chat() -> Self {
        Self {
            max_new_tokens: 180,
            do_sample: true,
            temperature: 0.75,
            top_p: 0.9,
            repetition_penalty: 1.1,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self::chat()
    }
}

/// Why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    EndOfSequence,
    Length,
}

/// Token accounting for one completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Raw continuation returned by a backend
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

impl Completion {
    #[cfg(test)]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: FinishReason::EndOfSequence,
            usage: Usage::default(),
        }
    }
}
