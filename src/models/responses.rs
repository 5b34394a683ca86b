//! Response DTOs for the generation service API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheStats, PerformanceSnapshot};
use crate::generation::GenerationResult;

/// Response body for POST /generate
#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    /// One result per request, in request order
    pub results: Vec<GenerationResult>,
    /// Results served from cache
    pub cached: usize,
    /// Results with an error
    pub failed: usize,
}

impl GenerateResponse {
    /// Creates a new GenerateResponse, counting cached and failed items
    pub fn new(results: Vec<GenerationResult>) -> Self {
        let cached = results.iter().filter(|r| r.from_cache).count();
        let failed = results.iter().filter(|r| !r.is_success()).count();
        Self {
            results,
            cached,
            failed,
        }
    }
}

/// Response body for the DELETE /cache/:key operation
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Outcome message
    pub message: String,
    /// The key that was deleted
    pub key: String,
    /// Whether an entry existed
    pub deleted: bool,
}

impl DeleteResponse {
    /// Creates a new DeleteResponse
    pub fn new(key: impl Into<String>, deleted: bool) -> Self {
        let key = key.into();
        let message = if deleted {
            format!("Key '{}' deleted successfully", key)
        } else {
            format!("Key '{}' was not cached", key)
        };
        Self {
            message,
            key,
            deleted,
        }
    }
}

/// Response body for DELETE /cache
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    /// Outcome message
    pub message: String,
    /// False if a tier could not be cleared
    pub cleared: bool,
}

impl ClearResponse {
    pub fn new(cleared: bool) -> Self {
        let message = if cleared {
            "Cache cleared".to_string()
        } else {
            "Cache cleared partially; see server logs".to_string()
        };
        Self { message, cleared }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Point-in-time cache statistics
    pub cache: CacheStats,
    /// Cumulative cache and batch counters
    pub performance: PerformanceSnapshot,
}

impl StatsResponse {
    pub fn new(cache: CacheStats, performance: PerformanceSnapshot) -> Self {
        Self { cache, performance }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
