//! API Module
//!
//! HTTP handlers and routing for the generation service REST API.
//!
//! # Endpoints
//! - `POST /generate` - Generate a batch of artifacts
//! - `DELETE /cache` - Clear the cache
//! - `DELETE /cache/:key` - Invalidate one cached artifact
//! - `GET /stats` - Get cache and batch statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
