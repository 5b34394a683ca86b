//! API Handlers
//!
//! HTTP request handlers for each generation service endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use tokio::time::Instant;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::generation::{BatchGenerationOrchestrator, GeneratorRegistry, OrchestratorConfig};
use crate::models::{
    ClearResponse, DeleteResponse, GenerateRequest, GenerateResponse, HealthResponse,
    StatsResponse,
};

/// Application state shared across all handlers.
///
/// The store does its own locking, so handlers share it through a plain `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Shared cache store
    pub store: Arc<CacheStore>,
    /// Batch orchestrator over the same store
    pub orchestrator: Arc<BatchGenerationOrchestrator>,
}

impl AppState {
    /// Creates a new AppState over an already opened store.
    pub fn new(
        store: Arc<CacheStore>,
        registry: GeneratorRegistry,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        let orchestrator = BatchGenerationOrchestrator::new(store.clone(), registry, config)?;
        Ok(Self {
            store,
            orchestrator: Arc::new(orchestrator),
        })
    }

    /// Opens the store described by `config` and builds the orchestrator.
    pub fn from_config(config: &Config, registry: GeneratorRegistry) -> Result<Self> {
        let store = Arc::new(CacheStore::open(config)?);
        Self::new(store, registry, OrchestratorConfig::from_config(config))
    }
}

/// Handler for POST /generate
///
/// Runs one batch; per-item failures are reported inside the results, so a
/// valid request always gets 200.
pub async fn generate_handler(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let results = match req.timeout_ms {
        Some(ms) => {
            let deadline = Instant::now() + Duration::from_millis(ms);
            state.orchestrator.generate_batch_until(req.requests, deadline).await
        }
        None => state.orchestrator.generate_batch(req.requests).await,
    };

    Ok(Json(GenerateResponse::new(results)))
}

/// Handler for DELETE /cache/:key
///
/// Invalidates one cached artifact by its derived key.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }

    let deleted = state.store.delete(&key).await;
    Ok(Json(DeleteResponse::new(key, deleted)))
}

/// Handler for DELETE /cache
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    Json(ClearResponse::new(state.store.clear().await))
}

/// Handler for GET /stats
///
/// Returns current cache statistics and cumulative batch counters.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = state.store.stats();
    let performance = state.store.tracker().snapshot();
    Json(StatsResponse::new(cache, performance))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
