//! Engine configuration

use std::path::PathBuf;

use recipe_neural::ModelManager;
use serde::{Deserialize, Serialize};

/// Where the engine finds its inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Vector index file (`.vdb` or FAISS flat index)
    pub index_path: PathBuf,

    /// Recipe table, row-aligned with the index
    pub metadata_path: PathBuf,

    /// Directory holding `model.onnx`, `tokenizer.json` and the manifest.
    /// Defaults to `RECIPE_MODEL_DIR`, else the per-user cache directory.
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Fetch missing model artifacts during initialization instead of
    /// requiring a prior `setup-models` run
    #[serde(default)]
    pub allow_download: bool,
}

fn default_model_dir() -> PathBuf {
    ModelManager::new().root().to_path_buf()
}

impl EngineConfig {
    pub fn new(index_path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            metadata_path: metadata_path.into(),
            model_dir: default_model_dir(),
            allow_download: false,
        }
    }

    pub fn with_model_dir(mut self, model_dir: impl Into<PathBuf>) -> Self {
        self.model_dir = model_dir.into();
        self
    }

    pub fn with_allow_download(mut self, allow: bool) -> Self {
        self.allow_download = allow;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(
            "embeddings_index/faiss_index.index",
            "embeddings_index/metadata.csv",
        )
    }
}
