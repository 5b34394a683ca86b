//! Error types for the artifact cache
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache layer.
///
/// Apart from `Configuration`, these are recovered inside the cache layer and
/// logged; they never cross the batch boundary.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid configuration, raised at construction time only
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Value could not be serialized for storage or sizing
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Remote or disk backend unreachable or misbehaving
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Backend(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CacheError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::Backend(_) => StatusCode::BAD_GATEWAY,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Generation Error Enum ==
/// Failure of a single generation unit.
///
/// Attached to the failing item's result; the rest of the batch proceeds.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum GenerationError {
    /// The generator ran and reported a failure
    #[error("generation failed: {0}")]
    Failed(String),

    /// No generator registered for the request type
    #[error("no generator registered for type '{0}'")]
    UnsupportedType(String),

    /// The generator panicked
    #[error("generator panicked: {0}")]
    Panicked(String),

    /// The batch deadline expired before this item completed
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
}

impl GenerationError {
    /// Convenience constructor for generator implementations.
    pub fn failed(msg: impl Into<String>) -> Self {
        GenerationError::Failed(msg.into())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
