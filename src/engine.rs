//! Recommendation engine
//!
//! Owns the vector index, the recipe table and the sentence embedder, and
//! walks them through a three-state lifecycle:
//!
//! ```text
//!                   initialize()
//!  Uninitialized ───────────────┬──▶ Ready      (all inputs loaded and aligned)
//!                               └──▶ Degraded   (reason recorded)
//! ```
//!
//! Ready and Degraded are final for the life of the process. Initialization
//! never returns an error to the caller: failures become the Degraded reason,
//! so a server can keep answering health checks.
//!
//! # Concurrency Model
//!
//! `initialize` takes `&mut self` and runs before the engine is shared.
//! Afterwards nothing is mutated; wrap the engine in an `Arc` and call
//! [`RecommendationEngine::query`] from any number of threads. The only lock
//! on the query path is the embedder's session mutex.

use std::time::Instant;

use recipe_core::{IndexError, MetadataError, MetadataStore, RecipeRecord, VectorIndex};
use recipe_neural::{InferenceError, SentenceEmbedder, TextEmbedder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;

/// Failure while bringing the engine up; becomes the Degraded reason
#[derive(Error, Debug)]
pub enum InitError {
    #[error("{0}")]
    Index(#[from] IndexError),

    #[error("{0}")]
    Metadata(#[from] MetadataError),

    #[error("embedding model unavailable: {0}")]
    Model(#[from] InferenceError),

    #[error("index has {index} vectors but metadata has {metadata} rows")]
    RowCountMismatch { index: usize, metadata: usize },

    #[error("index dimension {index} does not match embedder dimension {embedder}")]
    DimensionMismatch { index: usize, embedder: usize },
}

/// Failure of a single query
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("engine not ready ({state})")]
    NotReady { state: EngineState },

    #[error("embedding failed: {0}")]
    Embedding(#[source] InferenceError),

    #[error("search failed: {0}")]
    Search(#[from] IndexError),

    #[error("metadata lookup failed: {0}")]
    Lookup(#[from] MetadataError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Uninitialized,
    Ready,
    Degraded,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Ready => "ready",
            EngineState::Degraded => "degraded",
        };
        f.write_str(s)
    }
}

/// Snapshot returned by [`RecommendationEngine::status`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub state: EngineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

/// One ranked recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    #[serde(flatten)]
    pub recipe: RecipeRecord,
    /// Raw inner product; the ranking key
    pub similarity_score: f32,
    /// `similarity_score` clamped to [0, 1] and scaled to a percentage
    pub match_percent: f32,
}

/// Presentation transform of a cosine score: clamp to [0, 1], scale by 100,
/// round to two decimals.
pub fn match_percent(score: f32) -> f32 {
    let clamped = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
    (clamped * 100.0 * 100.0).round() / 100.0
}

struct Loaded {
    index: VectorIndex,
    metadata: MetadataStore,
    embedder: Box<dyn TextEmbedder>,
}

enum Lifecycle {
    Uninitialized,
    Ready(Loaded),
    Degraded(String),
}

pub struct RecommendationEngine {
    config: EngineConfig,
    lifecycle: Lifecycle,
}

impl std::fmt::Debug for RecommendationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecommendationEngine")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}

impl RecommendationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            lifecycle: Lifecycle::Uninitialized,
        }
    }

    /// Ready engine from components already in memory.
    pub fn from_parts(
        index: VectorIndex,
        metadata: MetadataStore,
        embedder: Box<dyn TextEmbedder>,
    ) -> Result<Self, InitError> {
        Ok(Self {
            config: EngineConfig::default(),
            lifecycle: Lifecycle::Ready(assemble(index, metadata, embedder)?),
        })
    }

    /// Load index, metadata and the ONNX sentence model from the configured
    /// paths.
    pub fn initialize(&mut self) -> EngineState {
        self.initialize_with(|config| {
            let embedder = if config.allow_download {
                SentenceEmbedder::with_download(&config.model_dir)?
            } else {
                SentenceEmbedder::new(&config.model_dir)?
            };
            Ok(Box::new(embedder))
        })
    }

    /// Like [`initialize`](Self::initialize) with a caller-supplied embedder
    /// loader. The loader runs only after index and metadata loaded cleanly.
    pub fn initialize_with<F>(&mut self, load_embedder: F) -> EngineState
    where
        F: FnOnce(&EngineConfig) -> Result<Box<dyn TextEmbedder>, InferenceError>,
    {
        if !matches!(self.lifecycle, Lifecycle::Uninitialized) {
            tracing::warn!(
                "initialize() called on an engine that is already {}; ignoring",
                self.state()
            );
            return self.state();
        }

        let started = Instant::now();
        tracing::info!(
            "Initializing recommendation engine (index {:?}, metadata {:?})",
            self.config.index_path,
            self.config.metadata_path
        );

        self.lifecycle = match load(&self.config, load_embedder) {
            Ok(loaded) => {
                tracing::info!(
                    "Recommendation engine ready: {} recipes, {} dims, {:.1}s",
                    loaded.index.len(),
                    loaded.index.dimensions(),
                    started.elapsed().as_secs_f64()
                );
                Lifecycle::Ready(loaded)
            }
            Err(e) => {
                tracing::warn!(
                    "Recommendation engine degraded: {}. Queries will be refused until restart.",
                    e
                );
                Lifecycle::Degraded(e.to_string())
            }
        };
        self.state()
    }

    pub fn state(&self) -> EngineState {
        match self.lifecycle {
            Lifecycle::Uninitialized => EngineState::Uninitialized,
            Lifecycle::Ready(_) => EngineState::Ready,
            Lifecycle::Degraded(_) => EngineState::Degraded,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Ready(_))
    }

    pub fn status(&self) -> EngineStatus {
        match &self.lifecycle {
            Lifecycle::Uninitialized => EngineStatus {
                state: EngineState::Uninitialized,
                reason: None,
                recipes: None,
                dimensions: None,
            },
            Lifecycle::Ready(loaded) => EngineStatus {
                state: EngineState::Ready,
                reason: None,
                recipes: Some(loaded.index.len()),
                dimensions: Some(loaded.index.dimensions()),
            },
            Lifecycle::Degraded(reason) => EngineStatus {
                state: EngineState::Degraded,
                reason: Some(reason.clone()),
                recipes: None,
                dimensions: None,
            },
        }
    }

    /// Recipes closest to `text`, best first.
    ///
    /// Returns `min(top_k, recipes)` results in the exact order the index
    /// ranked them.
    pub fn query(&self, text: &str, top_k: usize) -> Result<Vec<SimilarityResult>, QueryError> {
        if text.trim().is_empty() {
            return Err(QueryError::InvalidInput("ingredients must not be empty"));
        }
        if top_k == 0 {
            return Err(QueryError::InvalidInput("top_k must be positive"));
        }

        let loaded = match &self.lifecycle {
            Lifecycle::Ready(loaded) => loaded,
            _ => {
                return Err(QueryError::NotReady {
                    state: self.state(),
                })
            }
        };

        let started = Instant::now();
        let vector = loaded
            .embedder
            .encode(text)
            .map_err(QueryError::Embedding)?;
        let hits = loaded.index.search(&vector, top_k)?;

        let results = hits
            .into_iter()
            .map(|(row, score)| -> Result<SimilarityResult, QueryError> {
                Ok(SimilarityResult {
                    recipe: loaded.metadata.get(row)?.clone(),
                    similarity_score: score,
                    match_percent: match_percent(score),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            "query top_k={} -> {} results in {:.2}ms",
            top_k,
            results.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(results)
    }
}

fn load<F>(config: &EngineConfig, load_embedder: F) -> Result<Loaded, InitError>
where
    F: FnOnce(&EngineConfig) -> Result<Box<dyn TextEmbedder>, InferenceError>,
{
    let index = VectorIndex::load(&config.index_path)?;
    let metadata = MetadataStore::load(&config.metadata_path)?;
    // Also checked in `assemble`; failing here skips loading the model
    if index.len() != metadata.len() {
        return Err(InitError::RowCountMismatch {
            index: index.len(),
            metadata: metadata.len(),
        });
    }

    tracing::info!("Loading sentence model from {:?}", config.model_dir);
    let embedder = load_embedder(config)?;
    assemble(index, metadata, embedder)
}

fn assemble(
    index: VectorIndex,
    metadata: MetadataStore,
    embedder: Box<dyn TextEmbedder>,
) -> Result<Loaded, InitError> {
    if index.len() != metadata.len() {
        return Err(InitError::RowCountMismatch {
            index: index.len(),
            metadata: metadata.len(),
        });
    }
    if index.dimensions() != embedder.dimensions() {
        return Err(InitError::DimensionMismatch {
            index: index.dimensions(),
            embedder: embedder.dimensions(),
        });
    }
    Ok(Loaded {
        index,
        metadata,
        embedder,
    })
}
