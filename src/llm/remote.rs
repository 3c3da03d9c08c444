//! `OpenAI`-compatible text completion backend
//!
//! Talks to any server exposing `POST /v1/completions` with a raw prompt
//! (vLLM, llama.cpp server, TGI). The prompt is already chat-templated, so the
//! plain completions endpoint is used rather than chat completions.

use super::{Completion, FinishReason, LlmError, LlmService, SamplingConfig, Usage};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Completion service backed by an HTTP endpoint
pub struct RemoteCompletionService {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    stop: Vec<String>,
}

impl RemoteCompletionService {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        stop: &[&str],
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::load(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: completions_endpoint(base_url),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
            stop: stop.iter().map(|s| (*s).to_string()).collect(),
        })
    }

    fn translate_request<'a>(&'a self, prompt: &'a str, sampling: &SamplingConfig) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens: sampling.max_new_tokens,
            temperature: if sampling.do_sample { sampling.temperature } else { 0.0 },
            top_p: if sampling.do_sample { sampling.top_p } else { 1.0 },
            repetition_penalty: sampling.repetition_penalty,
            stop: &self.stop,
        }
    }
}

/// Accept a bare host, a `/v1` base, or the full endpoint
fn completions_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1/completions") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{base}/completions")
    } else {
        format!("{base}/v1/completions")
    }
}

fn classify_error(status: StatusCode, body: &str) -> LlmError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string());

    match status.as_u16() {
        401 | 403 => LlmError::auth(format!("Authentication failed: {message}")),
        400 | 422 => LlmError::invalid_request(format!("Invalid request: {message}")),
        408 | 504 => LlmError::timeout(format!("Upstream timeout: {message}")),
        500..=599 => LlmError::server_error(format!("Server error: {message}")),
        _ => LlmError::unknown(format!("HTTP {status}: {message}")),
    }
}

fn normalize_response(response: CompletionResponse) -> Result<Completion, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::unknown("Response contained no choices"))?;

    let finish_reason = match choice.finish_reason.as_deref() {
        Some("length") => FinishReason::Length,
        _ => FinishReason::EndOfSequence,
    };

    let usage = response.usage.map_or_else(Usage::default, |u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
    });

    Ok(Completion {
        text: choice.text,
        finish_reason,
        usage,
    })
}

#[async_trait]
impl LlmService for RemoteCompletionService {
    async fn complete(
        &self,
        prompt: &str,
        sampling: &SamplingConfig,
    ) -> Result<Completion, LlmError> {
        let body = self.translate_request(prompt, sampling);

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::timeout(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                LlmError::network(format!("Connection failed: {e}"))
            } else {
                LlmError::unknown(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, &text));
        }

        let parsed: CompletionResponse = serde_json::from_str(&text).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {text}"))
        })?;

        normalize_response(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: usize,
    temperature: f64,
    top_p: f64,
    /// Non-standard, honored by vLLM and llama.cpp
    repetition_penalty: f32,
    stop: &'a [String],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}
