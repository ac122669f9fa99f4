//! ONNX sentence embedding using ORT (ONNX Runtime)
//!
//! Implements the sentence-transformers recipe for all-MiniLM-L6-v2:
//! tokenize, run the encoder, mean-pool token states under the attention
//! mask, L2-normalize.

use std::path::Path;

use ort::session::{builder::SessionBuilder, Session};
use ort::value::Value;
use parking_lot::Mutex;
use thiserror::Error;
use tokenizers::{Tokenizer, TruncationParams};

use crate::models::{ModelError, ModelManager, ModelPaths};
use crate::{TextEmbedder, EMBEDDING_DIM};

/// Longest input the model was trained on, in word pieces
const MAX_SEQ_LEN: usize = 256;

const WARM_UP_TEXT: &str = "tomato, garlic, olive oil";

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    #[error("Unexpected model output shape {0:?}")]
    OutputShape(Vec<i64>),
    #[error("Model produces {actual}-dim embeddings, expected {expected}")]
    EmbeddingWidth { expected: usize, actual: usize },
    #[error("Empty input text")]
    EmptyInput,
    #[error("Inference panicked")]
    Panicked,
}

/// Sentence embedder backed by an ONNX Runtime session
pub struct SentenceEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    takes_token_types: bool,
    dim: usize,
}

impl std::fmt::Debug for SentenceEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentenceEmbedder")
            .field("dim", &self.dim)
            .finish()
    }
}

impl SentenceEmbedder {
    /// Load from a model directory prepared by `setup_models()`.
    ///
    /// Offline only: artifacts are verified against the manifest and nothing
    /// is downloaded.
    pub fn new(model_dir: &Path) -> Result<Self, InferenceError> {
        let paths = ModelManager::from_dir(model_dir).resolve_offline()?;
        Self::from_paths(&paths)
    }

    /// Stage missing artifacts first, then load.
    pub fn with_download(model_dir: &Path) -> Result<Self, InferenceError> {
        let paths = ModelManager::from_dir(model_dir).setup_models()?;
        Self::from_paths(&paths)
    }

    /// Load from explicit artifact paths and run one warm-up pass, which
    /// also fixes the output dimension.
    pub fn from_paths(paths: &ModelPaths) -> Result<Self, InferenceError> {
        // Global environment; a second init is harmless
        let _ = ort::init().with_name("recipe-recommender").commit();

        // intra_threads=1: callers already fan out across blocking threads
        let session = SessionBuilder::new()?
            .with_intra_threads(1)?
            .commit_from_file(&paths.model)?;
        let takes_token_types = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(&paths.tokenizer)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        let mut embedder = Self {
            session: Mutex::new(session),
            tokenizer,
            takes_token_types,
            dim: 0,
        };
        embedder.dim = check_width(embedder.embed(WARM_UP_TEXT)?.len())?;
        tracing::info!(
            "Sentence model loaded from {:?} ({} dims)",
            paths.model,
            embedder.dim
        );
        Ok(embedder)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        if text.trim().is_empty() {
            return Err(InferenceError::EmptyInput);
        }

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        let to_i64 = |xs: &[u32]| xs.iter().map(|&x| x as i64).collect::<Vec<i64>>();
        let input_ids = to_i64(encoding.get_ids());
        let attention_mask = to_i64(encoding.get_attention_mask());
        let token_type_ids = to_i64(encoding.get_type_ids());

        let shape = vec![1, input_ids.len()];
        let ids_val = Value::from_array((shape.clone(), input_ids))?;
        let mask_val = Value::from_array((shape.clone(), attention_mask.clone()))?;
        let types_val = Value::from_array((shape, token_type_ids))?;

        // A runtime panic (e.g. shape mismatch inside the graph) must not
        // take the calling worker down with it.
        let pooled = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut feed = ort::inputs!["input_ids" => ids_val, "attention_mask" => mask_val];
            if self.takes_token_types {
                feed.push(("token_type_ids".into(), types_val.into()));
            }

            let mut session = self.session.lock();
            let outputs = session.run(feed)?;
            let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
            mean_pool(shape, data, &attention_mask)
        }))
        .map_err(|_| InferenceError::Panicked)??;

        Ok(normalize(pooled))
    }
}

impl TextEmbedder for SentenceEmbedder {
    fn dimensions(&self) -> usize {
        self.dim
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        self.embed(text)
    }
}

/// The artifacts are pinned to MiniLM; any other width means the wrong graph
/// was staged.
fn check_width(actual: usize) -> Result<usize, InferenceError> {
    if actual != EMBEDDING_DIM {
        return Err(InferenceError::EmbeddingWidth {
            expected: EMBEDDING_DIM,
            actual,
        });
    }
    Ok(actual)
}

/// Reduce the model output to one sentence vector.
///
/// `[1, seq, dim]` token states are averaged over positions whose mask is
/// set; a `[1, dim]` output is already pooled.
pub fn mean_pool(shape: &[i64], data: &[f32], mask: &[i64]) -> Result<Vec<f32>, InferenceError> {
    match *shape {
        [1, dim] if dim > 0 && data.len() == dim as usize => Ok(data.to_vec()),
        [1, seq, dim] if dim > 0 && seq as usize == mask.len() => {
            let dim = dim as usize;
            if data.len() != mask.len() * dim {
                return Err(InferenceError::OutputShape(shape.to_vec()));
            }

            let mut sum = vec![0.0f32; dim];
            let mut kept = 0.0f32;
            for (token, &m) in data.chunks_exact(dim).zip(mask) {
                if m == 0 {
                    continue;
                }
                kept += 1.0;
                for (acc, x) in sum.iter_mut().zip(token) {
                    *acc += x;
                }
            }

            // sentence-transformers clamps the token count at 1e-9
            let denom = kept.max(1e-9);
            Ok(sum.into_iter().map(|x| x / denom).collect())
        }
        _ => Err(InferenceError::OutputShape(shape.to_vec())),
    }
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-6 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}
