//! Sentence model artifacts on disk
//!
//! The model directory holds `model.onnx`, `tokenizer.json` and a
//! `model-manifest.json` with their SHA-256 digests. Downloading is an
//! explicit step ([`ModelManager::setup_models`]); loading for inference only
//! ever goes through the `*_offline` accessors, which never touch the network
//! and refuse artifacts whose digest differs from the manifest.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// HuggingFace repository of the sentence model
pub const MODEL_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";

const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";
const MANIFEST_FILE: &str = "model-manifest.json";
const MANIFEST_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("Required model file missing: {0}")]
    ModelMissing(PathBuf),
    #[error("Model manifest missing: {0} (run `setup-models` first)")]
    ManifestMissing(PathBuf),
    #[error("Model manifest invalid at {path:?}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelManifest {
    version: u32,
    model_repo: String,
    model_sha256: String,
    tokenizer_sha256: String,
}

/// Verified artifact locations
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub model: PathBuf,
    pub tokenizer: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ModelManager {
    root: PathBuf,
}

impl ModelManager {
    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `RECIPE_MODEL_DIR` if set, otherwise the per-user cache directory.
    pub fn new() -> Self {
        if let Ok(p) = std::env::var("RECIPE_MODEL_DIR") {
            return Self::from_dir(PathBuf::from(p));
        }

        if let Some(dirs) = ProjectDirs::from("com", "recipe-recommender", "recipe-recommender") {
            Self::from_dir(dirs.cache_dir().join("models"))
        } else {
            Self::from_dir(PathBuf::from(".recipe-recommender/models"))
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    fn model_path(&self) -> PathBuf {
        self.root.join("model.onnx")
    }

    #[inline]
    fn tokenizer_path(&self) -> PathBuf {
        self.root.join("tokenizer.json")
    }

    #[inline]
    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    fn load_manifest(&self) -> Result<ModelManifest, ModelError> {
        let path = self.manifest_path();
        if !path.exists() {
            return Err(ModelError::ManifestMissing(path));
        }
        let bytes = fs::read(&path)?;
        let manifest: ModelManifest =
            serde_json::from_slice(&bytes).map_err(|e| ModelError::ManifestInvalid {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ModelError::ManifestInvalid {
                path,
                reason: format!("unsupported manifest version {}", manifest.version),
            });
        }
        Ok(manifest)
    }

    fn write_manifest(&self, manifest: &ModelManifest) -> Result<(), ModelError> {
        let path = self.manifest_path();
        let tmp_path = self.root.join(format!("{}.tmp", MANIFEST_FILE));
        let payload =
            serde_json::to_vec_pretty(manifest).map_err(|e| ModelError::ManifestInvalid {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let mut file = File::create(&tmp_path)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &path)?;
        sync_parent_dir(&path)?;
        Ok(())
    }

    fn ensure_verified(&self, path: PathBuf, expected: &str) -> Result<PathBuf, ModelError> {
        if !path.exists() {
            return Err(ModelError::ModelMissing(path));
        }
        let actual = compute_sha256(&path)?;
        if actual != expected {
            return Err(ModelError::ChecksumMismatch {
                path,
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(path)
    }

    /// ONNX graph path, verified against the manifest, no network access.
    pub fn get_model_offline(&self) -> Result<PathBuf, ModelError> {
        let manifest = self.load_manifest()?;
        self.ensure_verified(self.model_path(), &manifest.model_sha256)
    }

    /// Tokenizer path, verified against the manifest, no network access.
    pub fn get_tokenizer_offline(&self) -> Result<PathBuf, ModelError> {
        let manifest = self.load_manifest()?;
        self.ensure_verified(self.tokenizer_path(), &manifest.tokenizer_sha256)
    }

    /// Both artifacts, verified.
    pub fn resolve_offline(&self) -> Result<ModelPaths, ModelError> {
        Ok(ModelPaths {
            model: self.get_model_offline()?,
            tokenizer: self.get_tokenizer_offline()?,
        })
    }

    /// Download missing artifacts and pin their digests.
    ///
    /// Trust on first use: digests of whatever is on disk after the download
    /// are written to the manifest and enforced on every later load.
    pub fn setup_models(&self) -> Result<ModelPaths, ModelError> {
        fs::create_dir_all(&self.root)?;

        let model = self.model_path();
        let tokenizer = self.tokenizer_path();
        self.download_if_missing(MODEL_URL, &model)?;
        self.download_if_missing(TOKENIZER_URL, &tokenizer)?;

        let manifest = ModelManifest {
            version: MANIFEST_VERSION,
            model_repo: MODEL_REPO.to_string(),
            model_sha256: compute_sha256(&model)?,
            tokenizer_sha256: compute_sha256(&tokenizer)?,
        };
        self.write_manifest(&manifest)?;
        tracing::info!("Model artifacts staged in {:?}", self.root);

        self.resolve_offline()
    }

    fn download_if_missing(&self, url: &str, dest: &Path) -> Result<(), ModelError> {
        if dest.exists() {
            return Ok(());
        }
        tracing::info!("Downloading model artifact {} -> {:?}", url, dest);
        download_file(url, dest)
    }
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}

fn download_file(url: &str, dest: &Path) -> Result<(), ModelError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()?;

    let tmp_path = dest.with_extension("tmp");
    let mut response = client.get(url).send()?.error_for_status()?;
    let mut file = File::create(&tmp_path)?;
    response.copy_to(&mut file)?;
    file.sync_all()?;
    fs::rename(&tmp_path, dest)?;
    sync_parent_dir(dest)?;
    Ok(())
}

fn compute_sha256(path: &Path) -> Result<String, ModelError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn sync_parent_dir(path: &Path) -> Result<(), ModelError> {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            File::open(parent)?.sync_all()?;
        }
    }
    Ok(())
}
