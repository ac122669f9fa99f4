//! Recipe Neural – sentence embeddings for ingredient queries
//!
//! # Architecture
//!
//! ```text
//! query text
//!     │
//!     ▼
//! ┌───────────┐    ┌──────────────┐    ┌───────────┐    ┌───────────┐
//! │ Tokenizer │───▶│ MiniLM (ORT) │───▶│ Mean pool │───▶│ L2 norm   │
//! │ HF json   │    │  ONNX graph  │    │  (mask)   │    │ 384 dims  │
//! └───────────┘    └──────────────┘    └───────────┘    └───────────┘
//! ```
//!
//! Model artifacts are staged explicitly by [`models::ModelManager`];
//! inference never downloads anything.

pub mod inference;
pub mod models;

pub use inference::{InferenceError, SentenceEmbedder};
pub use models::{ModelError, ModelManager, ModelPaths};

/// Output width of all-MiniLM-L6-v2
pub const EMBEDDING_DIM: usize = 384;

/// Maps text to a unit-length vector.
///
/// Implementations must be deterministic and safe to call from many threads
/// at once.
pub trait TextEmbedder: Send + Sync {
    /// Length of every vector returned by [`TextEmbedder::encode`]
    fn dimensions(&self) -> usize;

    /// Embed `text`; the result has L2 norm 1 (or is all zeros).
    fn encode(&self, text: &str) -> Result<Vec<f32>, InferenceError>;
}
