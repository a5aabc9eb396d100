//! Request DTOs for the gateway API
//!
//! Defines the structure of incoming HTTP request bodies.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::payload::{MergeStrategy, Params, UploadPayload};
use crate::service::{FetchOptions, UploadOptions};

/// Request body for `POST /fetch`
#[derive(Debug, Clone, Deserialize)]
pub struct FetchRequest {
    /// Upstream endpoint, e.g. `/api/deals`
    pub endpoint: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Cache TTL in seconds
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub bypass_cache: bool,
    #[serde(default)]
    pub chunks: Option<usize>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub merge: MergeStrategy,
}

impl FetchRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.endpoint.is_empty() {
            return Some("Endpoint cannot be empty".to_string());
        }
        if self.chunks == Some(0) {
            return Some("Chunk count must be at least 1".to_string());
        }
        if self.concurrency == Some(0) {
            return Some("Concurrency must be at least 1".to_string());
        }
        None
    }

    pub fn params(&self) -> Params<Value> {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn options(&self) -> FetchOptions {
        FetchOptions {
            ttl: self.ttl.map(Duration::from_secs),
            bypass_cache: self.bypass_cache,
            chunks: self.chunks,
            concurrency: self.concurrency,
            timeout: self.timeout_ms.map(Duration::from_millis),
            max_retries: self.max_retries,
            merge: self.merge,
            on_progress: None,
        }
    }
}

/// Request body for `POST /upload`
#[derive(Debug, Clone, Deserialize)]
pub struct UploadRequest {
    pub endpoint: String,
    /// Array (split by element) or object (split by key)
    pub payload: Value,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl UploadRequest {
    pub fn validate(&self) -> Option<String> {
        if self.endpoint.is_empty() {
            return Some("Endpoint cannot be empty".to_string());
        }
        if !(self.payload.is_array() || self.payload.is_object()) {
            return Some("Payload must be an array or an object".to_string());
        }
        if self.chunk_size == Some(0) {
            return Some("Chunk size must be at least 1".to_string());
        }
        None
    }

    pub fn payload(&self) -> UploadPayload<Value> {
        UploadPayload::from_payload(self.payload.clone())
    }

    pub fn options(&self) -> UploadOptions {
        UploadOptions {
            chunk_size: self.chunk_size,
            max_retries: self.max_retries,
            on_progress: None,
        }
    }
}

/// Query string for `DELETE /cache`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClearCacheQuery {
    /// Only clear entries for this endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
}
