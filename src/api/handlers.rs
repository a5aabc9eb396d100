//! API Handlers
//!
//! HTTP request handlers for each gateway endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    Json,
};

use crate::client::{ApiService, HttpApiService};
use crate::config::Config;
use crate::error::{Result, ServiceError};
use crate::models::{
    ClearCacheQuery, ClearCacheResponse, FetchRequest, FetchResponse, HealthResponse,
    StatsResponse, UploadRequest, UploadResponse,
};
use crate::service::DataService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: DataService,
}

impl AppState {
    /// Creates a new AppState around an existing service.
    pub fn new(service: DataService) -> Self {
        Self { service }
    }

    /// Builds the service against the configured upstream.
    ///
    /// The HTTP client only bounds connection setup by the chunk timeout;
    /// per-attempt deadlines come from the data service.
    pub fn from_config(config: &Config) -> Result<Self> {
        let service_config = config.service_config();
        let connect_timeout = service_config.timeout.max(Duration::from_millis(100));
        let api: Arc<dyn ApiService> =
            Arc::new(HttpApiService::new(config.upstream_url.clone(), connect_timeout)?);
        Ok(Self::new(DataService::new(api, service_config)))
    }
}

/// Handler for POST /fetch
pub async fn fetch_handler(
    State(state): State<AppState>,
    Json(req): Json<FetchRequest>,
) -> Result<Json<FetchResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(ServiceError::InvalidRequest(error_msg));
    }

    let params = req.params();
    let key = state.service.cache_key(&req.endpoint, &params);
    let data = state
        .service
        .fetch_data(&req.endpoint, params, req.options())
        .await?;

    Ok(Json(FetchResponse::new(&key, data)))
}

/// Handler for POST /upload
pub async fn upload_handler(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(ServiceError::InvalidRequest(error_msg));
    }

    let upload = state
        .service
        .upload_data(&req.endpoint, req.payload(), req.options())
        .await?;

    Ok(Json(UploadResponse { upload }))
}

/// Handler for DELETE /cache
pub async fn clear_cache_handler(
    State(state): State<AppState>,
    Query(query): Query<ClearCacheQuery>,
) -> Json<ClearCacheResponse> {
    let endpoint = query.endpoint.as_deref();
    let removed = state.service.clear_cache(endpoint).await;
    Json(ClearCacheResponse::new(endpoint, removed))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.service.cache_stats().await;
    let in_flight = state.service.in_flight().await.len();
    Json(StatsResponse::new(&stats, in_flight))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ApiError, ApiResponse};
    use crate::payload::Params;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoApi;

    #[async_trait]
    impl ApiService for EchoApi {
        async fn get(&self, url: &str, params: &Params<Value>) -> std::result::Result<ApiResponse<Value>, ApiError> {
            Ok(ApiResponse::ok(json!([{"url": url, "params": params}])))
        }

        async fn post(&self, _url: &str, body: Value) -> std::result::Result<ApiResponse<Value>, ApiError> {
            Ok(ApiResponse::ok(json!({"received": body})))
        }
    }

    fn state() -> AppState {
        AppState::new(DataService::new(Arc::new(EchoApi), Default::default()))
    }

    #[tokio::test]
    async fn test_fetch_handler() {
        let req: FetchRequest = serde_json::from_value(json!({"endpoint": "/api/deals"})).unwrap();
        let response = fetch_handler(State(state()), Json(req)).await.unwrap();

        assert_eq!(response.key, "/api/deals:{}");
        assert_eq!(response.data[0]["url"], json!("/api/deals"));
    }

    #[tokio::test]
    async fn test_fetch_handler_invalid_request() {
        let req: FetchRequest = serde_json::from_value(json!({"endpoint": ""})).unwrap();
        let result = fetch_handler(State(state()), Json(req)).await;
        assert!(matches!(result, Err(ServiceError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_upload_handler_single_fragment() {
        let req: UploadRequest =
            serde_json::from_value(json!({"endpoint": "/api/rows", "payload": [1, 2]})).unwrap();
        let response = upload_handler(State(state()), Json(req)).await.unwrap();
        assert_eq!(response.upload, json!({"received": [1, 2]}));
    }

    #[tokio::test]
    async fn test_clear_cache_and_stats_handlers() {
        let state = state();
        let req: FetchRequest = serde_json::from_value(json!({"endpoint": "/api/deals"})).unwrap();
        fetch_handler(State(state.clone()), Json(req)).await.unwrap();

        let stats = stats_handler(State(state.clone())).await;
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.in_flight, 0);

        let cleared = clear_cache_handler(
            State(state.clone()),
            Query(ClearCacheQuery {
                endpoint: Some("/api/deals".to_string()),
            }),
        )
        .await;
        assert_eq!(cleared.removed, 1);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
