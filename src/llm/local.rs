//! In-process inference on Qwen2-family safetensors checkpoints via Candle
//!
//! Weights are fetched from the Hugging Face hub (cached on disk by `hf-hub`)
//! or read from a local directory. Loading happens at most once per process;
//! concurrent first requests wait on the same load.

use super::{ChatTemplate, Completion, FinishReason, LlmError, LlmService, SamplingConfig, Usage};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::qwen2::{Config as Qwen2Config, ModelForCausalLM};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;
use tokio::sync::OnceCell;

const WEIGHTS_INDEX: &str = "model.safetensors.index.json";
const SINGLE_WEIGHTS: &str = "model.safetensors";

/// Where the checkpoint comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Hub { repo: String, revision: String },
    Directory(PathBuf),
}

impl ModelSource {
    fn describe(&self) -> String {
        match self {
            ModelSource::Hub { repo, revision } => format!("{repo}@{revision}"),
            ModelSource::Directory(dir) => dir.display().to_string(),
        }
    }
}

/// Lazily loaded local model shared by every session
pub struct LocalModelService {
    model_id: String,
    source: ModelSource,
    template: ChatTemplate,
    force_cpu: bool,
    seed: Option<u64>,
    loaded: OnceCell<Arc<Mutex<LoadedModel>>>,
}

impl LocalModelService {
    pub fn new(
        model_id: impl Into<String>,
        source: ModelSource,
        template: ChatTemplate,
        force_cpu: bool,
        seed: Option<u64>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            source,
            template,
            force_cpu,
            seed,
            loaded: OnceCell::new(),
        }
    }

    /// Get the loaded model, loading it on first use.
    ///
    /// A failed load leaves the cell empty so the next call tries again.
    async fn model(&self) -> Result<Arc<Mutex<LoadedModel>>, LlmError> {
        self.loaded
            .get_or_try_init(|| async {
                let source = self.source.clone();
                let template = self.template;
                let force_cpu = self.force_cpu;
                tracing::info!(source = %source.describe(), "Loading model");
                let loaded = tokio::task::spawn_blocking(move || {
                    LoadedModel::load(&source, template, force_cpu)
                })
                .await
                .map_err(|e| LlmError::load(format!("Model load task failed: {e}")))??;
                Ok::<_, LlmError>(Arc::new(Mutex::new(loaded)))
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl LlmService for LocalModelService {
    async fn complete(
        &self,
        prompt: &str,
        sampling: &SamplingConfig,
    ) -> Result<Completion, LlmError> {
        let model = self.model().await?;
        let prompt = prompt.to_string();
        let sampling = sampling.clone();
        let seed = self.seed.unwrap_or_else(rand::random);

        // The KV cache makes the model non-reentrant; one generation at a time.
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| LlmError::inference("Model lock poisoned by an earlier panic"))?;
            model.generate(&prompt, &sampling, seed)
        })
        .await
        .map_err(|e| LlmError::inference(format!("Generation task failed: {e}")))?
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn warm_up(&self) -> Result<(), LlmError> {
        self.model().await.map(|_| ())
    }
}

struct LoadedModel {
    model: ModelForCausalLM,
    tokenizer: Tokenizer,
    device: Device,
    eos_token_ids: Vec<u32>,
}

struct CheckpointFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: Vec<PathBuf>,
}

impl LoadedModel {
    fn load(
        source: &ModelSource,
        template: ChatTemplate,
        force_cpu: bool,
    ) -> Result<Self, LlmError> {
        let files = match source {
            ModelSource::Hub { repo, revision } => fetch_from_hub(repo, revision)?,
            ModelSource::Directory(dir) => locate_in_directory(dir)?,
        };

        let device = if force_cpu {
            Device::Cpu
        } else {
            Device::cuda_if_available(0).map_err(candle_load_err)?
        };
        let dtype = if device.is_cuda() { DType::BF16 } else { DType::F32 };

        let config_bytes = std::fs::read(&files.config)
            .map_err(|e| LlmError::load(format!("Failed to read {}: {e}", files.config.display())))?;
        let config: Qwen2Config = serde_json::from_slice(&config_bytes)
            .map_err(|e| LlmError::load(format!("Failed to parse model config: {e}")))?;

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| LlmError::load(format!("Failed to load tokenizer: {e}")))?;

        let eos_token_ids: Vec<u32> = template
            .stop_tokens()
            .iter()
            .filter_map(|token| tokenizer.token_to_id(token))
            .collect();
        if eos_token_ids.is_empty() {
            return Err(LlmError::load(format!(
                "Tokenizer has none of the {template} stop tokens {:?}",
                template.stop_tokens()
            )));
        }

        // SAFETY: the shards are not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files.weights, dtype, &device) }
            .map_err(candle_load_err)?;
        let model = ModelForCausalLM::new(&config, vb).map_err(candle_load_err)?;

        tracing::info!(
            device = ?device,
            dtype = ?dtype,
            shards = files.weights.len(),
            eos_token_ids = ?eos_token_ids,
            "Model loaded"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            eos_token_ids,
        })
    }

    /// Tokenize, decode autoregressively, detokenize
    fn generate(
        &mut self,
        prompt: &str,
        sampling: &SamplingConfig,
        seed: u64,
    ) -> Result<Completion, LlmError> {
        self.model.clear_kv_cache();

        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| LlmError::inference(format!("Tokenization failed: {e}")))?;
        let prompt_tokens = encoding.get_ids().to_vec();
        if prompt_tokens.is_empty() {
            return Err(LlmError::inference("Prompt tokenized to nothing"));
        }

        let model = &mut self.model;
        let stream = decode(
            prompt_tokens,
            sampling,
            seed,
            &self.eos_token_ids,
            &self.device,
            |input, start_pos| model.forward(input, start_pos),
        )?;

        let text = self
            .tokenizer
            .decode(stream.generated(), true)
            .map_err(|e| LlmError::inference(format!("Detokenization failed: {e}")))?;

        tracing::debug!(
            prompt_tokens = stream.prompt_len(),
            completion_tokens = stream.generated().len(),
            "Local generation finished"
        );

        Ok(Completion {
            text,
            finish_reason: stream.finish_reason(),
            usage: Usage {
                prompt_tokens: stream.prompt_len() as u64,
                completion_tokens: stream.generated().len() as u64,
            },
        })
    }
}

/// Prompt plus generated tokens, and what the KV cache has already seen
struct TokenStream {
    tokens: Vec<u32>,
    prompt_len: usize,
    fed: usize,
    max_new_tokens: usize,
    finish: Option<FinishReason>,
}

impl TokenStream {
    fn new(prompt: Vec<u32>, max_new_tokens: usize) -> Self {
        Self {
            prompt_len: prompt.len(),
            tokens: prompt,
            fed: 0,
            max_new_tokens,
            finish: (max_new_tokens == 0).then_some(FinishReason::Length),
        }
    }

    /// Tokens the model has not seen yet and the position of the first one.
    /// The whole prompt on the first pass, then only the newest token.
    fn take_input(&mut self) -> Option<(usize, &[u32])> {
        if self.finish.is_some() {
            return None;
        }
        let start = self.fed;
        self.fed = self.tokens.len();
        Some((start, &self.tokens[start..]))
    }

    /// Record a sampled token. End-of-sequence tokens stop without being kept.
    fn accept(&mut self, token: u32, eos_token_ids: &[u32]) {
        if eos_token_ids.contains(&token) {
            self.finish = Some(FinishReason::EndOfSequence);
            return;
        }
        self.tokens.push(token);
        if self.generated().len() >= self.max_new_tokens {
            self.finish = Some(FinishReason::Length);
        }
    }

    /// Everything seen so far, for the repeat penalty
    fn context(&self) -> &[u32] {
        &self.tokens
    }

    fn generated(&self) -> &[u32] {
        &self.tokens[self.prompt_len..]
    }

    fn prompt_len(&self) -> usize {
        self.prompt_len
    }

    fn finish_reason(&self) -> FinishReason {
        self.finish.unwrap_or(FinishReason::Length)
    }
}

fn sampling_strategy(sampling: &SamplingConfig) -> Sampling {
    if sampling.do_sample {
        Sampling::TopP {
            p: sampling.top_p,
            temperature: sampling.temperature,
        }
    } else {
        Sampling::ArgMax
    }
}

/// Penalize tokens already in `context`, then pick the next one
fn next_token(
    logits: &Tensor,
    repetition_penalty: f32,
    context: &[u32],
    logits_processor: &mut LogitsProcessor,
) -> candle_core::Result<u32> {
    if (repetition_penalty - 1.0).abs() > f32::EPSILON {
        let penalized =
            candle_transformers::utils::apply_repeat_penalty(logits, repetition_penalty, context)?;
        logits_processor.sample(&penalized)
    } else {
        logits_processor.sample(logits)
    }
}

/// Run the sampling loop against `forward`, which maps a `(1, n)` batch of
/// token ids at `start_pos` to `(1, 1, vocab)` logits for the last position.
fn decode(
    prompt: Vec<u32>,
    sampling: &SamplingConfig,
    seed: u64,
    eos_token_ids: &[u32],
    device: &Device,
    mut forward: impl FnMut(&Tensor, usize) -> candle_core::Result<Tensor>,
) -> Result<TokenStream, LlmError> {
    let mut logits_processor = LogitsProcessor::from_sampling(seed, sampling_strategy(sampling));
    let mut stream = TokenStream::new(prompt, sampling.max_new_tokens);

    while let Some((start_pos, input)) = stream.take_input() {
        let input = Tensor::new(input, device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(candle_inference_err)?;

        let logits = forward(&input, start_pos)
            .and_then(|l| l.squeeze(0))
            .and_then(|l| l.squeeze(0))
            .and_then(|l| l.to_dtype(DType::F32))
            .map_err(candle_inference_err)?;

        let token = next_token(
            &logits,
            sampling.repetition_penalty,
            stream.context(),
            &mut logits_processor,
        )
        .map_err(candle_inference_err)?;
        stream.accept(token, eos_token_ids);
    }

    Ok(stream)
}

fn fetch_from_hub(repo_id: &str, revision: &str) -> Result<CheckpointFiles, LlmError> {
    let api = Api::new()
        .map_err(|e| LlmError::load(format!("Failed to initialize Hugging Face hub client: {e}")))?;
    let repo = api.repo(Repo::with_revision(
        repo_id.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));
    let get = |file: &str| {
        repo.get(file)
            .map_err(|e| LlmError::load(format!("Failed to fetch {file} from {repo_id}: {e}")))
    };

    let config = get("config.json")?;
    let tokenizer = get("tokenizer.json")?;
    let weights = match repo.get(WEIGHTS_INDEX) {
        Ok(index) => {
            let index = std::fs::read_to_string(&index)
                .map_err(|e| LlmError::load(format!("Failed to read {WEIGHTS_INDEX}: {e}")))?;
            shard_names(&index)?
                .iter()
                .map(|name| get(name))
                .collect::<Result<Vec<_>, _>>()?
        }
        // Small checkpoints ship a single unsharded file
        Err(_) => vec![get(SINGLE_WEIGHTS)?],
    };

    Ok(CheckpointFiles {
        config,
        tokenizer,
        weights,
    })
}

fn locate_in_directory(dir: &Path) -> Result<CheckpointFiles, LlmError> {
    let require = |name: &str| {
        let path = dir.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(LlmError::load(format!("Missing {}", path.display())))
        }
    };

    let config = require("config.json")?;
    let tokenizer = require("tokenizer.json")?;
    let index_path = dir.join(WEIGHTS_INDEX);
    let weights = if index_path.is_file() {
        let index = std::fs::read_to_string(&index_path)
            .map_err(|e| LlmError::load(format!("Failed to read {}: {e}", index_path.display())))?;
        shard_names(&index)?
            .iter()
            .map(|name| require(name))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        vec![require(SINGLE_WEIGHTS)?]
    };

    Ok(CheckpointFiles {
        config,
        tokenizer,
        weights,
    })
}

#[derive(Deserialize)]
struct WeightsIndex {
    weight_map: HashMap<String, String>,
}

/// Distinct shard file names referenced by a safetensors index, sorted
fn shard_names(index_json: &str) -> Result<Vec<String>, LlmError> {
    let index: WeightsIndex = serde_json::from_str(index_json)
        .map_err(|e| LlmError::load(format!("Failed to parse {WEIGHTS_INDEX}: {e}")))?;
    let shards: BTreeSet<String> = index.weight_map.into_values().collect();
    if shards.is_empty() {
        return Err(LlmError::load(format!("{WEIGHTS_INDEX} lists no shards")));
    }
    Ok(shards.into_iter().collect())
}

#[allow(clippy::needless_pass_by_value)] // used as a map_err fn pointer
fn candle_load_err(e: candle_core::Error) -> LlmError {
    LlmError::load(e.to_string())
}

#[allow(clippy::needless_pass_by_value)] // used as a map_err fn pointer
fn candle_inference_err(e: candle_core::Error) -> LlmError {
    LlmError::inference(e.to_string())
}
