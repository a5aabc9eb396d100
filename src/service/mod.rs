//! Data Service Module
//!
//! [`DataService`] owns the cache, the map of in-flight fetches and the
//! upstream client. It is cheap to clone; clones share all state.
//!
//! - `fetch_data`: cache lookup, request deduplication, chunked fetch, merge,
//!   cycle-safe persistence
//! - `upload_data`: fragment split, sequential upload with retry, completion call

mod fetch;
pub mod scheduler;
pub mod tracker;
mod upload;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::cache::{CacheKey, CacheStats, CacheStore};
use crate::client::ApiService;
use crate::error::Result;
use crate::payload::{MergeStrategy, Params, Payload};

pub use scheduler::ProgressCallback;
pub use tracker::{ChunkState, ChunkTask, RequestTracker, TrackerSnapshot};
pub use upload::UploadSession;

// == Service Config ==
/// Defaults applied when a call does not override them.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub default_ttl: Duration,
    pub concurrency: usize,
    /// Deadline of a first chunk attempt
    pub timeout: Duration,
    pub max_retries: u32,
    pub upload_chunk_size: usize,
    /// Delay before a first retry
    pub backoff_base: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            concurrency: 3,
            timeout: Duration::from_millis(30_000),
            max_retries: 3,
            upload_chunk_size: 1000,
            backoff_base: Duration::from_secs(1),
        }
    }
}

// == Fetch Options ==
/// Per-call overrides for [`DataService::fetch_data`].
#[derive(Clone, Default)]
pub struct FetchOptions {
    pub ttl: Option<Duration>,
    pub bypass_cache: bool,
    /// Number of chunks to request (default 1)
    pub chunks: Option<usize>,
    pub concurrency: Option<usize>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub merge: MergeStrategy,
    /// Only the caller that starts a fetch receives progress
    pub on_progress: Option<ProgressCallback>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    pub fn chunks(mut self, chunks: usize) -> Self {
        self.chunks = Some(chunks);
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn merge(mut self, merge: MergeStrategy) -> Self {
        self.merge = merge;
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("ttl", &self.ttl)
            .field("bypass_cache", &self.bypass_cache)
            .field("chunks", &self.chunks)
            .field("concurrency", &self.concurrency)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("merge", &self.merge)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

// == Upload Options ==
/// Per-call overrides for [`DataService::upload_data`].
#[derive(Clone, Default)]
pub struct UploadOptions {
    pub chunk_size: Option<usize>,
    pub max_retries: Option<u32>,
    pub on_progress: Option<ProgressCallback>,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

/// A fetch in progress: its tracker and the outcome every joiner awaits.
struct InFlight<T> {
    tracker: Arc<StdMutex<RequestTracker>>,
    result: Shared<BoxFuture<'static, Result<T>>>,
}

// == Data Service ==
pub struct DataService<T: Payload = Value> {
    api: Arc<dyn ApiService<T>>,
    cache: Arc<RwLock<CacheStore>>,
    trackers: Arc<Mutex<HashMap<String, InFlight<T>>>>,
    config: ServiceConfig,
}

impl<T: Payload> Clone for DataService<T> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            cache: self.cache.clone(),
            trackers: self.trackers.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T: Payload> DataService<T> {
    // == Constructor ==
    pub fn new(api: Arc<dyn ApiService<T>>, config: ServiceConfig) -> Self {
        Self {
            api,
            cache: Arc::new(RwLock::new(CacheStore::new())),
            trackers: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The key `fetch_data` would use for these arguments.
    pub fn cache_key(&self, endpoint: &str, params: &Params<T>) -> CacheKey {
        CacheKey::derive(endpoint, params)
    }

    // == Cache Management ==
    /// Drops every cached entry for `endpoint`, or the whole cache for None.
    /// Returns the number of entries removed.
    pub async fn clear_cache(&self, endpoint: Option<&str>) -> usize {
        let mut cache = self.cache.write().await;
        match endpoint {
            Some(endpoint) => {
                let keys = cache.keys_by_prefix(&CacheKey::endpoint_prefix(endpoint));
                keys.iter().filter(|key| cache.delete(key)).count()
            }
            None => {
                let removed = cache.len();
                cache.clear();
                removed
            }
        }
    }

    /// True if a live entry exists for `key`.
    pub async fn is_cached(&self, key: &CacheKey) -> bool {
        self.cache.write().await.has(key.as_str())
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.read().await.stats()
    }

    // == Tracker Introspection ==
    /// Keys with a fetch currently in flight.
    pub async fn in_flight(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.trackers.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Current state of the in-flight fetch for `key`, if any.
    pub async fn tracker(&self, key: &CacheKey) -> Option<TrackerSnapshot> {
        let trackers = self.trackers.lock().await;
        let in_flight = trackers.get(key.as_str())?;
        let snapshot = in_flight
            .tracker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .snapshot();
        Some(snapshot)
    }
}
