//! Response DTOs for the gateway API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheKey, CacheStats};

/// Response body for `POST /fetch`
#[derive(Debug, Clone, Serialize)]
pub struct FetchResponse {
    /// Cache key the result is stored under
    pub key: String,
    /// True when the key was built from parameter names only
    pub degraded_key: bool,
    pub data: Value,
}

impl FetchResponse {
    pub fn new(key: &CacheKey, data: Value) -> Self {
        Self {
            key: key.to_string(),
            degraded_key: key.is_degraded(),
            data,
        }
    }
}

/// Response body for `POST /upload`
#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    /// Data returned by the upstream's final call
    pub upload: Value,
}

/// Response body for `DELETE /cache`
#[derive(Debug, Clone, Serialize)]
pub struct ClearCacheResponse {
    pub message: String,
    pub removed: usize,
}

impl ClearCacheResponse {
    pub fn new(endpoint: Option<&str>, removed: usize) -> Self {
        let message = match endpoint {
            Some(endpoint) => format!("Cleared {removed} entries for '{endpoint}'"),
            None => format!("Cleared {removed} entries"),
        };
        Self { message, removed }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped because they were found expired
    pub expired: u64,
    pub total_entries: usize,
    /// hits / (hits + misses)
    pub hit_rate: f64,
    /// Fetches currently running
    pub in_flight: usize,
}

impl StatsResponse {
    pub fn new(stats: &CacheStats, in_flight: usize) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            expired: stats.expired,
            total_entries: stats.total_entries,
            hit_rate: stats.hit_rate(),
            in_flight,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fetch_response_flags_degraded_key() {
        let resp = FetchResponse::new(&CacheKey::Degraded("/x:~keys[a]".into()), json!([]));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["degraded_key"], json!(true));
        assert_eq!(json["key"], json!("/x:~keys[a]"));
    }

    #[test]
    fn test_stats_response_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            expired: 5,
            total_entries: 10,
        };
        let resp = StatsResponse::new(&stats, 2);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
        assert_eq!(resp.in_flight, 2);
    }

    #[test]
    fn test_clear_cache_message() {
        assert_eq!(
            ClearCacheResponse::new(Some("/api/deals"), 3).message,
            "Cleared 3 entries for '/api/deals'"
        );
        assert_eq!(ClearCacheResponse::new(None, 0).message, "Cleared 0 entries");
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }
}
