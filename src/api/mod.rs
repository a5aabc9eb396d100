//! API Module
//!
//! HTTP handlers and routing for the gateway REST API.
//!
//! # Endpoints
//! - `POST /fetch` - Chunked, cached fetch from the upstream
//! - `POST /upload` - Chunked upload to the upstream
//! - `DELETE /cache` - Clear cached entries
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
