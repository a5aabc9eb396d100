//! Chunk Relay - chunked, cached data fetch and upload
//!
//! Fetches logical resources from an upstream API in concurrent chunks with
//! deduplication, TTL caching and retry, and uploads large payloads as
//! sequential fragments.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod payload;
pub mod service;

pub use api::AppState;
pub use config::Config;
pub use error::{ErrorKind, ServiceError};
pub use service::{DataService, FetchOptions, ServiceConfig, UploadOptions};
