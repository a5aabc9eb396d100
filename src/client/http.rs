//! reqwest-backed [`ApiService`]

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{ApiError, ApiResponse, ApiService};
use crate::payload::Params;

/// Upstream error bodies are cut to this many characters in error messages
const MAX_ERROR_BODY: usize = 512;

/// Calls a JSON API rooted at `base_url`.
#[derive(Debug, Clone)]
pub struct HttpApiService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApiService {
    /// Creates a client that only bounds connection setup. Whole-request
    /// deadlines belong to the caller, which grows them per retry.
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Resolves an endpoint against the base URL. Absolute URLs pass through.
    pub fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    async fn into_api_response(response: reqwest::Response) -> Result<ApiResponse<Value>, ApiError> {
        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message: String = String::from_utf8_lossy(&body)
                .chars()
                .take(MAX_ERROR_BODY)
                .collect();
            return Err(ApiError::Status {
                status: status.as_u16(),
                status_text,
                message,
            });
        }

        let data = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))?
        };

        Ok(ApiResponse {
            data,
            status: status.as_u16(),
            status_text,
            headers,
        })
    }
}

/// Flattens params into query pairs: strings verbatim, everything else as
/// compact JSON.
pub(crate) fn query_pairs(params: &Params<Value>) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(name, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (name.clone(), text)
        })
        .collect()
}

#[async_trait]
impl ApiService for HttpApiService {
    async fn get(&self, url: &str, params: &Params<Value>) -> Result<ApiResponse<Value>, ApiError> {
        let url = self.url(url);
        debug!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .query(&query_pairs(params))
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Self::into_api_response(response).await
    }

    async fn post(&self, url: &str, body: Value) -> Result<ApiResponse<Value>, ApiError> {
        let url = self.url(url);
        debug!(%url, "POST");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Self::into_api_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_join() {
        let api = HttpApiService::new("http://upstream:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(api.url("/api/deals"), "http://upstream:8080/api/deals");
        assert_eq!(api.url("api/deals"), "http://upstream:8080/api/deals");
        assert_eq!(api.url("https://other/x"), "https://other/x");
    }

    #[test]
    fn test_query_pairs() {
        let mut params = Params::new();
        params.insert("q".to_string(), json!("open deals"));
        params.insert("chunkIndex".to_string(), json!(2));
        params.insert("filter".to_string(), json!({"min": 10}));

        assert_eq!(
            query_pairs(&params),
            vec![
                ("chunkIndex".to_string(), "2".to_string()),
                ("filter".to_string(), r#"{"min":10}"#.to_string()),
                ("q".to_string(), "open deals".to_string()),
            ]
        );
    }
}
