//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::service::ServiceConfig;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Base URL of the upstream API
    pub upstream_url: String,
    /// Default cache TTL in seconds
    pub default_ttl: u64,
    /// Default number of chunks fetched at once per request
    pub chunk_concurrency: usize,
    /// Deadline of a first chunk attempt in milliseconds
    pub chunk_timeout_ms: u64,
    /// Retries per chunk or upload fragment
    pub max_retries: u32,
    /// Elements (or keys) per upload fragment
    pub upload_chunk_size: usize,
    /// Delay before the first retry in milliseconds
    pub backoff_base_ms: u64,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `UPSTREAM_URL` - Upstream API base URL (default: http://localhost:8080)
    /// - `DEFAULT_TTL` - Cache TTL in seconds (default: 300)
    /// - `CHUNK_CONCURRENCY` - Concurrent chunks per fetch (default: 3)
    /// - `CHUNK_TIMEOUT_MS` - First-attempt chunk deadline (default: 30000)
    /// - `MAX_RETRIES` - Retries per chunk or fragment (default: 3)
    /// - `UPLOAD_CHUNK_SIZE` - Elements per upload fragment (default: 1000)
    /// - `BACKOFF_BASE_MS` - Delay before the first retry (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            upstream_url: env::var("UPSTREAM_URL").unwrap_or(defaults.upstream_url),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            chunk_concurrency: env_or("CHUNK_CONCURRENCY", defaults.chunk_concurrency),
            chunk_timeout_ms: env_or("CHUNK_TIMEOUT_MS", defaults.chunk_timeout_ms),
            max_retries: env_or("MAX_RETRIES", defaults.max_retries),
            upload_chunk_size: env_or("UPLOAD_CHUNK_SIZE", defaults.upload_chunk_size),
            backoff_base_ms: env_or("BACKOFF_BASE_MS", defaults.backoff_base_ms),
        }
    }

    /// Service defaults derived from this configuration.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            default_ttl: Duration::from_secs(self.default_ttl),
            concurrency: self.chunk_concurrency.max(1),
            timeout: Duration::from_millis(self.chunk_timeout_ms),
            max_retries: self.max_retries,
            upload_chunk_size: self.upload_chunk_size.max(1),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            upstream_url: "http://localhost:8080".to_string(),
            default_ttl: 300,
            chunk_concurrency: 3,
            chunk_timeout_ms: 30_000,
            max_retries: 3,
            upload_chunk_size: 1000,
            backoff_base_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.default_ttl, 300);
        assert_eq!(config.chunk_concurrency, 3);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.upload_chunk_size, 1000);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in [
            "SERVER_PORT",
            "UPSTREAM_URL",
            "DEFAULT_TTL",
            "CHUNK_CONCURRENCY",
            "CHUNK_TIMEOUT_MS",
            "MAX_RETRIES",
            "UPLOAD_CHUNK_SIZE",
            "BACKOFF_BASE_MS",
        ] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.upstream_url, "http://localhost:8080");
        assert_eq!(config.chunk_timeout_ms, 30_000);
        assert_eq!(config.backoff_base_ms, 1000);
    }

    #[test]
    fn test_service_config_conversion() {
        let config = Config {
            chunk_concurrency: 0,
            upload_chunk_size: 0,
            ..Config::default()
        };
        let service = config.service_config();
        assert_eq!(service.default_ttl, Duration::from_secs(300));
        assert_eq!(service.timeout, Duration::from_secs(30));
        assert_eq!(service.concurrency, 1);
        assert_eq!(service.upload_chunk_size, 1);
        assert_eq!(service.backoff_base, Duration::from_secs(1));
    }
}
