//! Fetch orchestration
//!
//! One fetch per cache key at a time: the first caller spawns the work and
//! registers it; later callers with the same key await the same outcome.
//! The spawned task keeps running if every caller goes away.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::FutureExt;
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::scheduler::{run_chunks, ProgressCallback, SchedulerConfig};
use super::{DataService, FetchOptions, InFlight, RequestTracker};
use crate::cache::CacheKey;
use crate::error::{Result, ServiceError};
use crate::payload::{merge_chunks, CyclePolicy, MergeStrategy, Params, Payload};

/// Everything the spawned fetch task needs, resolved from options and defaults.
struct FetchPlan<T> {
    key: CacheKey,
    endpoint: String,
    params: Params<T>,
    chunks: usize,
    scheduler: SchedulerConfig,
    merge: MergeStrategy,
    ttl: Duration,
    on_progress: Option<ProgressCallback>,
}

impl<T: Payload> DataService<T> {
    // == Fetch Data ==
    /// Returns the payload for `endpoint` + `params`, from cache when a live
    /// entry exists (unless `bypass_cache`), otherwise by fetching
    /// `options.chunks` chunks and merging them.
    ///
    /// A call made while a fetch for the same key is running joins it, even
    /// with `bypass_cache` set.
    pub async fn fetch_data(
        &self,
        endpoint: &str,
        params: Params<T>,
        options: FetchOptions,
    ) -> Result<T> {
        let chunks = options.chunks.unwrap_or(1);
        if chunks == 0 {
            return Err(ServiceError::InvalidRequest(
                "chunk count must be at least 1".to_string(),
            ));
        }

        let key = CacheKey::derive(endpoint, &params);

        let outcome = {
            let mut trackers = self.trackers.lock().await;

            if let Some(existing) = trackers.get(key.as_str()) {
                debug!(key = %key, "joining in-flight fetch");
                existing.result.clone()
            } else {
                if !options.bypass_cache {
                    if let Some(hit) = self.cache.write().await.get(key.as_str()) {
                        debug!(key = %key, "cache hit");
                        return Ok(T::from_json(hit));
                    }
                }

                let plan = FetchPlan {
                    key: key.clone(),
                    endpoint: endpoint.to_string(),
                    params,
                    chunks,
                    scheduler: SchedulerConfig {
                        max_retries: options.max_retries.unwrap_or(self.config.max_retries),
                        timeout: options.timeout.unwrap_or(self.config.timeout),
                        backoff_base: self.config.backoff_base,
                    },
                    merge: options.merge,
                    ttl: options.ttl.unwrap_or(self.config.default_ttl),
                    on_progress: options.on_progress,
                };
                let concurrency = options.concurrency.unwrap_or(self.config.concurrency);

                let in_flight = self.spawn_fetch(plan, concurrency);
                let outcome = in_flight.result.clone();
                trackers.insert(key.as_str().to_string(), in_flight);
                outcome
            }
        };

        outcome.await
    }

    fn spawn_fetch(&self, plan: FetchPlan<T>, concurrency: usize) -> InFlight<T> {
        let tracker = Arc::new(StdMutex::new(RequestTracker::new(
            plan.key.as_str(),
            plan.chunks,
            concurrency,
        )));

        let service = self.clone();
        let task_tracker = tracker.clone();
        let handle = tokio::spawn(async move {
            let result = service.run_fetch(&plan, task_tracker).await;
            service.trackers.lock().await.remove(plan.key.as_str());
            result
        });

        let result = async move {
            handle.await.unwrap_or_else(|e| {
                Err(ServiceError::Internal(format!("fetch task aborted: {e}")))
            })
        }
        .boxed()
        .shared();

        InFlight { tracker, result }
    }

    async fn run_fetch(
        &self,
        plan: &FetchPlan<T>,
        tracker: Arc<StdMutex<RequestTracker>>,
    ) -> Result<T> {
        info!(key = %plan.key, chunks = plan.chunks, "fetching");

        let fetched = run_chunks(
            tracker,
            &plan.scheduler,
            plan.on_progress.as_ref(),
            |index, _retry_count| {
                let api = self.api.clone();
                let params = chunk_params(&plan.params, index, plan.chunks);
                async move {
                    api.get(&plan.endpoint, &params)
                        .await
                        .map(|response| response.data)
                        .map_err(ServiceError::from)
                }
            },
        )
        .await;

        let chunks = match fetched {
            Ok(chunks) => chunks,
            Err(err) => {
                error!(key = %plan.key, error = %err, "fetch failed");
                return Err(err);
            }
        };

        let merged = merge_chunks(chunks, plan.merge)?;
        self.persist(&plan.key, &merged, plan.ttl).await;
        info!(key = %plan.key, "fetch complete");
        Ok(merged)
    }

    /// Caches an acyclic snapshot of `value`. Failure to snapshot only skips
    /// the cache write.
    async fn persist(&self, key: &CacheKey, value: &T, ttl: Duration) {
        match value.to_json(CyclePolicy::Mark) {
            Ok(snapshot) => {
                self.cache.write().await.set(key.as_str(), snapshot, ttl);
                debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "result cached");
            }
            Err(err) => {
                warn!(key = %key, error = %err, "result not serializable, skipping cache write");
            }
        }
    }
}

/// Parameters for chunk `index` of `total`. Single-chunk fetches send the
/// caller's params unchanged.
fn chunk_params<T: Payload>(params: &Params<T>, index: usize, total: usize) -> Params<T> {
    let mut params = params.clone();
    if total > 1 {
        params.insert("chunkIndex".to_string(), T::from_json(json!(index)));
        params.insert("totalChunks".to_string(), T::from_json(json!(total)));
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_chunk_params_single_chunk_untouched() {
        let mut params: Params<Value> = Params::new();
        params.insert("status".to_string(), json!("open"));
        assert_eq!(chunk_params(&params, 0, 1), params);
    }

    #[test]
    fn test_chunk_params_tags_index() {
        let params: Params<Value> = Params::new();
        let tagged = chunk_params(&params, 2, 4);
        assert_eq!(tagged["chunkIndex"], json!(2));
        assert_eq!(tagged["totalChunks"], json!(4));
    }
}
