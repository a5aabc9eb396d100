//! Error types for the data service
//!
//! Provides unified error handling using thiserror. Every variant maps to an
//! [`ErrorKind`] so callers can branch on the failure class instead of
//! matching message text.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::client::ApiError;

// == Error Kind ==
/// Discriminator for [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ChunkFailed,
    FragmentFailed,
    Upstream,
    Timeout,
    Merge,
    InvalidRequest,
    Internal,
}

// == Service Error Enum ==
/// Unified error type for fetch and upload operations.
///
/// `Clone` so that a single outcome can be handed to every caller that joined
/// the same in-flight fetch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// A fetch chunk exhausted its retries
    #[error("Chunk {chunk_id} failed after {attempts} attempts: {reason}")]
    ChunkFailed {
        chunk_id: String,
        attempts: u32,
        reason: String,
    },

    /// An upload fragment exhausted its retries
    #[error("Upload fragment {index} failed after {attempts} attempts: {reason}")]
    FragmentFailed {
        index: usize,
        attempts: u32,
        reason: String,
    },

    /// The upstream API rejected a call
    #[error("Upstream error: {0}")]
    Upstream(#[from] ApiError),

    /// A single attempt ran past its deadline
    #[error("Timed out after {0}ms")]
    Timeout(u64),

    /// Chunk payloads could not be combined
    #[error("Merge error: {0}")]
    Merge(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::ChunkFailed { .. } => ErrorKind::ChunkFailed,
            ServiceError::FragmentFailed { .. } => ErrorKind::FragmentFailed,
            ServiceError::Upstream(_) => ErrorKind::Upstream,
            ServiceError::Timeout(_) => ErrorKind::Timeout,
            ServiceError::Merge(_) => ErrorKind::Merge,
            ServiceError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::InvalidRequest | ErrorKind::Merge => StatusCode::BAD_REQUEST,
            ErrorKind::ChunkFailed | ErrorKind::FragmentFailed | ErrorKind::Upstream => {
                StatusCode::BAD_GATEWAY
            }
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the data service.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_discriminates_variants() {
        let err = ServiceError::ChunkFailed {
            chunk_id: "/api/x:{}-chunk-2".to_string(),
            attempts: 3,
            reason: "boom".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ChunkFailed);
        assert!(err.to_string().contains("/api/x:{}-chunk-2"));

        let err = ServiceError::FragmentFailed {
            index: 1,
            attempts: 4,
            reason: "boom".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::FragmentFailed);
        assert!(err.to_string().contains("fragment 1"));
    }

    #[test]
    fn test_api_error_converts_to_upstream() {
        let err: ServiceError = ApiError::Transport("connection refused".into()).into();
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[test]
    fn test_into_response_status() {
        let response = ServiceError::InvalidRequest("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ServiceError::Timeout(10).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let response = ServiceError::ChunkFailed {
            chunk_id: "k-chunk-0".into(),
            attempts: 1,
            reason: "x".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
