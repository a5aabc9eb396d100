//! Upstream API client
//!
//! The data service talks to its upstream through [`ApiService`], an opaque
//! async `get`/`post` pair returning a response envelope. Any transport can sit
//! behind it; [`HttpApiService`] is the reqwest-backed one used by the server.

mod http;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::payload::{Params, Payload};

pub use http::HttpApiService;

// == Response Envelope ==
/// What every upstream call resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub data: T,
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
}

impl<T> ApiResponse<T> {
    /// A `200 OK` envelope with no headers.
    pub fn ok(data: T) -> Self {
        Self {
            data,
            status: 200,
            status_text: "OK".to_string(),
            headers: BTreeMap::new(),
        }
    }
}

// == Api Error ==
/// Failure reported by an [`ApiService`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The upstream answered with a non-success status
    #[error("HTTP {status} {status_text}: {message}")]
    Status {
        status: u16,
        status_text: String,
        message: String,
    },

    /// The request never produced a response
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded
    #[error("invalid response body: {0}")]
    Decode(String),
}

// == Api Service ==
/// Generic HTTP collaborator.
#[async_trait]
pub trait ApiService<T: Payload = Value>: Send + Sync {
    async fn get(&self, url: &str, params: &Params<T>) -> Result<ApiResponse<T>, ApiError>;

    async fn post(&self, url: &str, body: T) -> Result<ApiResponse<T>, ApiError>;
}
