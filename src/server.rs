//! HTTP Server for the recommendation engine
//!
//! Thin axum layer over [`RecommendationEngine`]: request decoding, status
//! code mapping and CORS. No ranking logic lives here.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness plus engine status (always 200)
//! - `POST /recommend` - Ranked recipes for an ingredient list

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::{EngineState, EngineStatus, QueryError, RecommendationEngine, SimilarityResult};

/// Shared application state
///
/// The engine is immutable once initialized, so handlers share it through
/// a plain `Arc` with no lock.
pub type AppState = Arc<RecommendationEngine>;

/// Recommend request body
#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendRequest {
    /// Free-text ingredient list
    pub ingredients: String,

    /// Number of results to return (default: 10)
    #[serde(default = "default_top_k")]
    pub top_k: i64,
}

fn default_top_k() -> i64 {
    10
}

/// Recommend response
#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendResponse {
    /// The query text as it was embedded
    pub query: String,
    pub results: Vec<SimilarityResult>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "ok", "degraded" or "uninitialized"
    pub status: String,
    pub engine: EngineStatus,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn query_error_status(err: &QueryError) -> StatusCode {
    match err {
        QueryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        QueryError::NotReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
        QueryError::Embedding(_) | QueryError::Search(_) | QueryError::Lookup(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// GET /health
async fn health(State(engine): State<AppState>) -> impl IntoResponse {
    let engine = engine.status();
    let status = match engine.state {
        EngineState::Ready => "ok",
        EngineState::Degraded => "degraded",
        EngineState::Uninitialized => "uninitialized",
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: status.to_string(),
            engine,
        }),
    )
}

/// POST /recommend
///
/// Embedding is CPU-bound, so the query runs on the blocking pool.
async fn recommend(
    State(engine): State<AppState>,
    Json(request): Json<RecommendRequest>,
) -> Response {
    let top_k = match usize::try_from(request.top_k) {
        Ok(k) if k > 0 => k,
        _ => return error_response(StatusCode::BAD_REQUEST, "top_k must be positive"),
    };

    let query = request.ingredients.to_lowercase();
    tracing::debug!("recommend: {:?} (top {})", query, top_k);

    let start = Instant::now();
    let text = query.clone();
    let outcome = tokio::task::spawn_blocking(move || engine.query(&text, top_k)).await;

    match outcome {
        Ok(Ok(results)) => {
            tracing::info!(
                "recommend: {} results in {:.2}ms",
                results.len(),
                start.elapsed().as_secs_f64() * 1000.0
            );
            (StatusCode::OK, Json(RecommendResponse { query, results })).into_response()
        }
        Ok(Err(e)) => {
            let status = query_error_status(&e);
            if status.is_server_error() {
                tracing::warn!("recommend failed: {}", e);
            }
            error_response(status, e.to_string())
        }
        Err(e) => {
            tracing::error!("recommend task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "query task failed")
        }
    }
}

/// Create the axum router
pub fn create_router(engine: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/recommend", post(recommend))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(engine)
}

/// Start the server
pub async fn serve(engine: AppState, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let router = create_router(engine);

    tracing::info!("Starting recipe recommender on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
