//! Generation Module
//!
//! Request types, cache key derivation, the generator registry and the
//! batch orchestrator that ties them to the cache.

mod builtin;
mod fingerprint;
mod generator;
mod orchestrator;
mod request;

pub use builtin::{builtin_registry, DatasetSummary, DATASET_SUMMARY};
pub use fingerprint::{canonical_json, derive_key};
pub use generator::{Generator, GeneratorRegistry};
pub use orchestrator::{BatchGenerationOrchestrator, OrchestratorConfig};
pub use request::{GenerationRequest, GenerationResult};
