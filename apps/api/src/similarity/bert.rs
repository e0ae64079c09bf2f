//! Candle BERT sentence encoder (all-MiniLM-L6-v2 by default).
//!
//! Pipeline per text:
//! 1. tokenize without special tokens, no tokenizer-side truncation
//! 2. split ids into windows of `max_tokens - 2`, wrap each in `[CLS] .. [SEP]`
//! 3. batched forward passes (at most `WINDOW_BATCH` windows each) with an
//!    attention mask
//! 4. masked mean pooling per window
//! 5. `Truncate` keeps only the first window; `Chunk` averages all windows
//!    weighted by token count
//! 6. L2 normalize

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::similarity::embedder::{EmbedderLoader, TextEmbedder};
use crate::similarity::error::ScoringError;
use crate::similarity::vector::{weighted_mean, EmbeddingVector};

pub const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_REVISION: &str = "main";
/// all-MiniLM-L6-v2 was trained with 256-token inputs.
pub const DEFAULT_MAX_TOKENS: usize = 256;
/// Room for `[CLS]`, `[SEP]` and a handful of content tokens.
pub const MIN_MAX_TOKENS: usize = 8;
/// Windows per forward pass in chunk mode.
const WINDOW_BATCH: usize = 16;

/// Where the model files come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    HuggingFace { repo: String, revision: String },
    /// Directory holding `config.json`, `tokenizer.json`, `model.safetensors`.
    LocalDir(PathBuf),
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::HuggingFace { repo, revision } => write!(f, "{repo}@{revision}"),
            ModelSource::LocalDir(dir) => write!(f, "{}", dir.display()),
        }
    }
}

/// What to do with text longer than one token window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LongTextPolicy {
    /// Embed the first window only.
    #[default]
    Truncate,
    /// Embed every window and average them.
    Chunk,
}

impl FromStr for LongTextPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "truncate" => Ok(LongTextPolicy::Truncate),
            "chunk" => Ok(LongTextPolicy::Chunk),
            other => bail!("unknown long-text policy '{other}' (expected 'truncate' or 'chunk')"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingOptions {
    pub source: ModelSource,
    /// Token window including `[CLS]` and `[SEP]`.
    pub max_tokens: usize,
    pub long_text: LongTextPolicy,
}

impl Default for EmbeddingOptions {
    fn default() -> Self {
        Self {
            source: ModelSource::HuggingFace {
                repo: DEFAULT_MODEL_ID.to_string(),
                revision: DEFAULT_REVISION.to_string(),
            },
            max_tokens: DEFAULT_MAX_TOKENS,
            long_text: LongTextPolicy::Truncate,
        }
    }
}

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl ModelFiles {
    fn in_dir(dir: &Path) -> Result<Self> {
        let files = Self {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights: dir.join("model.safetensors"),
        };
        for path in [&files.config, &files.tokenizer, &files.weights] {
            if !path.is_file() {
                bail!("model file not found: {}", path.display());
            }
        }
        Ok(files)
    }

    fn from_hub(repo: &str, revision: &str) -> Result<Self> {
        let api = ApiBuilder::new()
            .with_progress(false)
            .build()
            .context("failed to initialise Hugging Face hub client")?;
        let repo = api.repo(Repo::with_revision(
            repo.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));

        let fetch = |name: &str| {
            repo.get(name)
                .with_context(|| format!("failed to fetch {name} from the hub"))
        };

        Ok(Self {
            config: fetch("config.json")?,
            tokenizer: fetch("tokenizer.json")?,
            weights: fetch("model.safetensors")?,
        })
    }
}

/// Only the fields we need beyond what `BertConfig` exposes.
#[derive(Debug, Deserialize)]
struct ModelShape {
    hidden_size: usize,
    max_position_embeddings: usize,
}

pub struct BertSentenceEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    name: String,
    dimension: usize,
    max_tokens: usize,
    long_text: LongTextPolicy,
    cls_id: u32,
    sep_id: u32,
    pad_id: u32,
}

impl BertSentenceEmbedder {
    /// Resolves the model files and builds the encoder on the CPU. Blocking.
    pub fn load(options: &EmbeddingOptions) -> Result<Self> {
        let device = Device::Cpu;
        info!(source = %options.source, ?device, "Resolving embedding model files");

        let files = match &options.source {
            ModelSource::LocalDir(dir) => ModelFiles::in_dir(dir)?,
            ModelSource::HuggingFace { repo, revision } => ModelFiles::from_hub(repo, revision)?,
        };

        let config_str = std::fs::read_to_string(&files.config)
            .with_context(|| format!("failed to read {}", files.config.display()))?;
        let config: BertConfig = serde_json::from_str(&config_str)
            .with_context(|| format!("failed to parse {}", files.config.display()))?;
        let shape: ModelShape = serde_json::from_str(&config_str)
            .with_context(|| format!("failed to parse {}", files.config.display()))?;

        // Safety: the safetensors file is not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[files.weights.as_path()], DTYPE, &device)
                .with_context(|| {
                    format!("failed to load weights from {}", files.weights.display())
                })?
        };
        let model = BertModel::load(vb, &config).context("failed to build BERT model")?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(|e| {
            anyhow!("failed to load tokenizer from {}: {e}", files.tokenizer.display())
        })?;
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(None)
            .map_err(|e| anyhow!("failed to disable tokenizer truncation: {e}"))?;

        let cls_id = tokenizer
            .token_to_id("[CLS]")
            .ok_or_else(|| anyhow!("tokenizer has no [CLS] token"))?;
        let sep_id = tokenizer
            .token_to_id("[SEP]")
            .ok_or_else(|| anyhow!("tokenizer has no [SEP] token"))?;
        let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);

        let max_tokens = options
            .max_tokens
            .clamp(MIN_MAX_TOKENS, shape.max_position_embeddings.max(MIN_MAX_TOKENS));

        info!(
            dimension = shape.hidden_size,
            max_tokens,
            long_text = ?options.long_text,
            "Embedding model loaded"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            name: options.source.to_string(),
            dimension: shape.hidden_size,
            max_tokens,
            long_text: options.long_text,
            cls_id,
            sep_id,
            pad_id,
        })
    }

    /// Returns one mean-pooled row per window plus that window's token count.
    fn pool_windows(
        &self,
        windows: &[Vec<u32>],
    ) -> Result<(Vec<Vec<f32>>, Vec<f32>), ScoringError> {
        pool_in_groups(windows, self.pad_id, &self.device, |input_ids, attention_mask| {
            let token_type_ids = input_ids.zeros_like()?;
            self.model.forward(input_ids, &token_type_ids, Some(attention_mask))
        })
    }
}

/// Runs `forward` over at most `WINDOW_BATCH` windows at a time, so memory
/// stays bounded however long the text is, and pools each window.
///
/// `forward` maps `[batch, seq_len]` ids and mask to `[batch, seq_len, dim]`.
fn pool_in_groups(
    windows: &[Vec<u32>],
    pad_id: u32,
    device: &Device,
    mut forward: impl FnMut(&Tensor, &Tensor) -> candle_core::Result<Tensor>,
) -> Result<(Vec<Vec<f32>>, Vec<f32>), ScoringError> {
    let mut rows = Vec::with_capacity(windows.len());
    let mut weights = Vec::with_capacity(windows.len());

    for group in windows.chunks(WINDOW_BATCH) {
        let (ids, mask, seq_len) = pad_batch(group, pad_id);
        let input_ids = Tensor::from_vec(ids, (group.len(), seq_len), device)?;
        let attention_mask = Tensor::from_vec(mask, (group.len(), seq_len), device)?;

        let hidden = forward(&input_ids, &attention_mask)?;
        let (group_rows, group_weights) = masked_mean_pool(&hidden, &attention_mask)?;
        rows.extend(group_rows);
        weights.extend(group_weights);
    }

    Ok((rows, weights))
}

/// Splits token ids into `[CLS] body [SEP]` windows of at most `body` content
/// tokens. `Truncate` keeps only the first window.
pub fn split_windows(
    ids: &[u32],
    cls_id: u32,
    sep_id: u32,
    body: usize,
    policy: LongTextPolicy,
) -> Vec<Vec<u32>> {
    let limit = match policy {
        LongTextPolicy::Truncate => 1,
        LongTextPolicy::Chunk => usize::MAX,
    };
    ids.chunks(body.max(1))
        .take(limit)
        .map(|chunk| {
            let mut window = Vec::with_capacity(chunk.len() + 2);
            window.push(cls_id);
            window.extend_from_slice(chunk);
            window.push(sep_id);
            window
        })
        .collect()
}

/// Right-pads windows to a common length. Returns flat ids, flat attention
/// mask and the padded sequence length.
fn pad_batch(windows: &[Vec<u32>], pad_id: u32) -> (Vec<u32>, Vec<u32>, usize) {
    let seq_len = windows.iter().map(Vec::len).max().unwrap_or(0);
    let mut ids = vec![pad_id; windows.len() * seq_len];
    let mut mask = vec![0u32; windows.len() * seq_len];
    for (row, window) in windows.iter().enumerate() {
        for (col, &id) in window.iter().enumerate() {
            ids[row * seq_len + col] = id;
            mask[row * seq_len + col] = 1;
        }
    }
    (ids, mask, seq_len)
}

/// Mean of `hidden` ([batch, seq_len, dim]) over the positions where
/// `attention_mask` ([batch, seq_len]) is set. Returns the pooled rows and the
/// number of unmasked tokens per row.
pub fn masked_mean_pool(
    hidden: &Tensor,
    attention_mask: &Tensor,
) -> candle_core::Result<(Vec<Vec<f32>>, Vec<f32>)> {
    let mask = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
    let summed = hidden.to_dtype(DType::F32)?.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?;
    let pooled = summed.broadcast_div(&counts)?;

    let rows = pooled.to_vec2::<f32>()?;
    let weights = counts.squeeze(1)?.to_vec1::<f32>()?;
    Ok((rows, weights))
}

impl TextEmbedder for BertSentenceEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<EmbeddingVector, ScoringError> {
        if text.trim().is_empty() {
            return Err(ScoringError::EmptyInput);
        }

        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| ScoringError::Inference(format!("tokenization failed: {e}")))?;
        let ids = encoding.get_ids();
        if ids.is_empty() {
            return Err(ScoringError::EmptyInput);
        }

        let windows = split_windows(
            ids,
            self.cls_id,
            self.sep_id,
            self.max_tokens - 2,
            self.long_text,
        );
        debug!(
            tokens = ids.len(),
            windows = windows.len(),
            "Embedding text"
        );

        let (rows, weights) = self.pool_windows(&windows)?;
        let mean = weighted_mean(&rows, &weights)?;
        EmbeddingVector::normalized(mean)
    }
}

/// Loads a `BertSentenceEmbedder` off the async runtime.
pub struct BertLoader {
    options: EmbeddingOptions,
}

impl BertLoader {
    pub fn new(options: EmbeddingOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl EmbedderLoader for BertLoader {
    async fn load(&self) -> Result<Arc<dyn TextEmbedder>, ScoringError> {
        let options = self.options.clone();
        let loaded = tokio::task::spawn_blocking(move || BertSentenceEmbedder::load(&options))
            .await
            .map_err(|e| ScoringError::ModelUnavailable(format!("model loader panicked: {e}")))?
            .map_err(|e| ScoringError::ModelUnavailable(format!("{e:#}")))?;
        Ok(Arc::new(loaded))
    }
}
