//! Recipe Recommender CLI
//!
//! # Usage
//!
//! ```bash
//! # Fetch and pin the sentence model
//! recipe-recommender setup-models
//!
//! # Start the server
//! recipe-recommender serve --index faiss_index.index --metadata metadata.csv --port 8000
//!
//! # Inspect an index file
//! recipe-recommender stats --index faiss_index.index
//!
//! # One-off query without the server
//! recipe-recommender recommend --index faiss_index.index --metadata metadata.csv "tomato, garlic"
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use recipe_core::VectorIndex;
use recipe_neural::ModelManager;
use recipe_recommender::server::serve;
use recipe_recommender::{EngineConfig, RecommendationEngine};

#[derive(Parser)]
#[command(name = "recipe-recommender")]
#[command(about = "Recommend recipes semantically similar to a list of ingredients")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct EngineArgs {
    /// Vector index file (.vdb or FAISS flat index)
    #[arg(short, long)]
    index: PathBuf,

    /// Recipe metadata CSV, row-aligned with the index
    #[arg(short, long)]
    metadata: PathBuf,

    /// Directory holding model.onnx, tokenizer.json and the manifest
    /// [default: $RECIPE_MODEL_DIR or the user cache directory]
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Download missing model artifacts during startup
    #[arg(long)]
    allow_download: bool,
}

impl From<EngineArgs> for EngineConfig {
    fn from(args: EngineArgs) -> Self {
        let config = EngineConfig::new(args.index, args.metadata);
        let config = match args.model_dir {
            Some(dir) => config.with_model_dir(dir),
            None => config,
        };
        config.with_allow_download(args.allow_download)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[command(flatten)]
        engine: EngineArgs,

        /// Server port
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
    },

    /// Download and pin the sentence model ahead of serving
    SetupModels {
        /// Model directory [default: $RECIPE_MODEL_DIR or the user cache directory]
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },

    /// Display statistics about an index file
    Stats {
        /// Path to .vdb or FAISS index
        #[arg(short, long)]
        index: PathBuf,
    },

    /// Run a single query and print the results as JSON
    Recommend {
        #[command(flatten)]
        engine: EngineArgs,

        /// Number of results
        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,

        /// Ingredient list
        ingredients: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { engine, port, host } => {
            let engine = load_engine(engine.into()).await?;
            if !engine.is_ready() {
                tracing::warn!("Serving in degraded mode: /recommend will answer 503");
            }

            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .with_context(|| format!("invalid bind address {}:{}", host, port))?;
            serve(Arc::new(engine), addr).await?;
        }

        Commands::SetupModels { model_dir } => {
            let paths = tokio::task::spawn_blocking(move || {
                model_dir
                    .map(ModelManager::from_dir)
                    .unwrap_or_default()
                    .setup_models()
            })
            .await??;
            println!("Model ready: {}", paths.model.display());
            println!("Tokenizer ready: {}", paths.tokenizer.display());
        }

        Commands::Stats { index } => {
            let loaded = VectorIndex::load(&index)?;
            println!("File: {}", index.display());
            println!("Format: {}", loaded.format());
            println!("Vectors: {}", loaded.len());
            println!("Dimensions: {}", loaded.dimensions());
            println!(
                "Memory: {:.2} MB",
                loaded.memory_bytes() as f64 / (1024.0 * 1024.0)
            );
        }

        Commands::Recommend {
            engine,
            top_k,
            ingredients,
        } => {
            let engine = load_engine(engine.into()).await?;
            if !engine.is_ready() {
                let status = engine.status();
                bail!(
                    "engine is {}: {}",
                    status.state,
                    status.reason.unwrap_or_default()
                );
            }

            let query = ingredients.to_lowercase();
            let results = engine.query(&query, top_k)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "query": query,
                    "results": results,
                }))?
            );
        }
    }

    Ok(())
}

/// Initialization does blocking I/O and model loading; keep it off the
/// async workers.
async fn load_engine(config: EngineConfig) -> anyhow::Result<RecommendationEngine> {
    let engine = tokio::task::spawn_blocking(move || {
        let mut engine = RecommendationEngine::new(config);
        engine.initialize();
        engine
    })
    .await
    .context("engine initialization task failed")?;
    Ok(engine)
}
