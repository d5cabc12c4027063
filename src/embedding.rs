//! # Embedding provider
//!
//! Maps normalized text to a fixed-length dense vector. The production
//! implementation ([`SentenceEmbedder`]) runs
//! [all-MiniLM-L6-v2](https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2)
//! with Candle (pure Rust ML framework): tokenize, BERT forward pass, mean
//! pooling over the attention mask, L2 normalization. Output vectors are
//! 384-dimensional and unit length, so cosine similarity between them is a
//! plain dot product.
//!
//! Providers are deterministic — the same model and the same input text
//! always produce bit-identical vectors — and side-effect-free, safe to call
//! concurrently from multiple in-flight requests (`&self`, `Send + Sync`).
//!
//! Input longer than [`MAX_EMBED_CHARS`] is silently clipped, not rejected:
//! a long document's tail is traded away for bounded latency and memory.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use tokenizers::Tokenizer;

use crate::error::EmbeddingError;

/// Dimensionality of the sentence embeddings (MiniLM-L6).
pub const EMBEDDING_DIMENSION: usize = 384;

/// Maximum number of characters fed to the embedding model. Longer input is
/// clipped at a char boundary before tokenization.
pub const MAX_EMBED_CHARS: usize = 512;

/// Maps text to a fixed-dimension vector.
///
/// Implementations must be deterministic for identical input, report a
/// constant [`dimension`](EmbeddingProvider::dimension) for their lifetime,
/// and apply the [`MAX_EMBED_CHARS`] clip themselves (via
/// [`clip_for_embedding`]).
pub trait EmbeddingProvider: Send + Sync {
    /// Length of every vector this provider produces.
    fn dimension(&self) -> usize;

    /// Embed `text` into a dense vector of exactly `dimension()` entries.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Clip `text` to [`MAX_EMBED_CHARS`] characters without splitting a char.
pub fn clip_for_embedding(text: &str) -> &str {
    match text.char_indices().nth(MAX_EMBED_CHARS) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

impl From<candle_core::Error> for EmbeddingError {
    fn from(e: candle_core::Error) -> Self {
        EmbeddingError::Inference(e.to_string())
    }
}

/// Sentence embeddings via Candle.
///
/// Model weights are fetched from the Hugging Face Hub on first load and
/// cached locally by `hf-hub`. Loading is expensive (~100MB of weights);
/// construct once and share behind an `Arc`.
///
/// # Example
/// ```no_run
/// use memoseek::embedding::{EmbeddingProvider, SentenceEmbedder};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let embedder = SentenceEmbedder::load()?;
/// let v = embedder.embed("Rust is great!")?;
/// assert_eq!(v.len(), embedder.dimension());
/// # Ok(()) }
/// ```
pub struct SentenceEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl SentenceEmbedder {
    /// Load all-MiniLM-L6-v2 from the Hugging Face Hub.
    ///
    /// # Errors
    /// Returns [`EmbeddingError::ModelLoad`] if the hub is unreachable or the
    /// downloaded artifacts cannot be parsed.
    pub fn load() -> Result<Self, EmbeddingError> {
        let device = Device::Cpu;
        let model_id = "sentence-transformers/all-MiniLM-L6-v2";
        let revision = "main";

        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, revision.to_string());
        let api = Api::new().map_err(|e| EmbeddingError::ModelLoad(e.to_string()))?;
        let api_repo = api.repo(repo);

        let config_filename = api_repo
            .get("config.json")
            .map_err(|e| EmbeddingError::ModelLoad(e.to_string()))?;
        let tokenizer_filename = api_repo
            .get("tokenizer.json")
            .map_err(|e| EmbeddingError::ModelLoad(e.to_string()))?;
        let weights_filename = api_repo
            .get("model.safetensors")
            .map_err(|e| EmbeddingError::ModelLoad(e.to_string()))?;

        let config = std::fs::read_to_string(config_filename)
            .map_err(|e| EmbeddingError::ModelLoad(e.to_string()))?;
        let config: Config = serde_json::from_str(&config)
            .map_err(|e| EmbeddingError::ModelLoad(e.to_string()))?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| EmbeddingError::ModelLoad(format!("failed to load tokenizer: {e}")))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)
                .map_err(|e| EmbeddingError::ModelLoad(e.to_string()))?
        };
        let model =
            BertModel::load(vb, &config).map_err(|e| EmbeddingError::ModelLoad(e.to_string()))?;

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::Tokenization(e.to_string()))?;

        let token_ids = Tensor::new(tokens.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let output = self.model.forward(&token_ids, &token_type_ids, None)?;

        let embedding = self.mean_pooling(&output, tokens.get_attention_mask())?;
        let embedding = self.l2_normalize(&embedding)?;

        Ok(embedding.to_vec1::<f32>()?)
    }

    /// Mean pooling over token embeddings, weighted by the attention mask.
    fn mean_pooling(
        &self,
        embeddings: &Tensor,
        attention_mask: &[u32],
    ) -> Result<Tensor, EmbeddingError> {
        // embeddings: [1, seq_len, hidden]; mask broadcast as [1, seq_len, 1]
        let mask = Tensor::new(attention_mask, &self.device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;

        let masked = embeddings.broadcast_mul(&mask)?;
        let sum = masked.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;
        let mean = sum.broadcast_div(&count)?;

        Ok(mean.squeeze(0)?)
    }

    fn l2_normalize(&self, tensor: &Tensor) -> Result<Tensor, EmbeddingError> {
        let norm = tensor.sqr()?.sum_all()?.sqrt()?;
        Ok(tensor.broadcast_div(&norm)?)
    }
}

impl EmbeddingProvider for SentenceEmbedder {
    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.encode(clip_for_embedding(text))
    }
}

/// Deterministic bag-of-tokens embedder for tests. Each whitespace token is
/// FNV-1a hashed into a bucket; the bucket histogram is L2-normalized, so
/// overlapping token sets score high cosine similarity and identical inputs
/// produce bit-identical vectors without any model download.
#[cfg(test)]
pub(crate) struct TokenHashEmbedder {
    dimension: usize,
}

#[cfg(test)]
impl TokenHashEmbedder {
    pub(crate) fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn fnv1a(token: &str) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }
}

#[cfg(test)]
impl EmbeddingProvider for TokenHashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in clip_for_embedding(text).split_whitespace() {
            let bucket = (Self::fnv1a(token) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}
