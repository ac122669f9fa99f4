//! Recipe Recommender: semantic recipe search from a free-text ingredient list
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP API (axum)                        │
//! │                POST /recommend, GET /health                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  RecommendationEngine                       │
//! │      Uninitialized → Ready | Degraded · query · status       │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                    │
//!          ▼                   ▼                    ▼
//! ┌────────────────┐  ┌─────────────────┐  ┌─────────────────┐
//! │ SentenceEmbed- │  │   VectorIndex   │  │  MetadataStore  │
//! │ der (ORT)      │  │ exact top-k IP  │  │  CSV, row order │
//! └────────────────┘  └─────────────────┘  └─────────────────┘
//! ```

pub mod config;
pub mod engine;
pub mod server;

pub use config::EngineConfig;
pub use engine::{
    match_percent, EngineState, EngineStatus, InitError, QueryError, RecommendationEngine,
    SimilarityResult,
};
pub use recipe_core::{MetadataStore, RecipeRecord, VectorIndex};
pub use recipe_neural::{SentenceEmbedder, TextEmbedder, EMBEDDING_DIM};
