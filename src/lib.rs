//! Artifact Cache - cache-backed parallel artifact generation
//!
//! Serves generation requests from a byte-bounded cache with pluggable
//! eviction, and generates misses on a bounded worker pool.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod generation;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::CacheStore;
pub use config::Config;
pub use error::{CacheError, GenerationError};
pub use generation::{BatchGenerationOrchestrator, GenerationRequest, GenerationResult};
pub use tasks::spawn_cleanup_task;
