//! Chunk Scheduler Module
//!
//! Drives every chunk of a [`RequestTracker`] to completion on the calling
//! task. Attempts run concurrently up to the tracker's limit; a failed attempt
//! is re-queued behind the others after an exponential backoff, and each
//! retry gets a longer deadline than the last.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, warn};

use super::tracker::{FailureOutcome, RequestTracker};
use crate::error::{Result, ServiceError};

/// Per-attempt deadline multiplier applied once per retry
const TIMEOUT_GROWTH: f64 = 1.5;

/// Progress sink, called with a percentage in `0.0..=100.0`.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

// == Scheduler Config ==
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_retries: u32,
    /// Deadline of the first attempt
    pub timeout: Duration,
    /// Delay before the first retry; doubles for each later one
    pub backoff_base: Duration,
}

impl SchedulerConfig {
    /// `timeout * 1.5^retry_count`, saturating at `Duration::MAX`.
    pub fn attempt_timeout(&self, retry_count: u32) -> Duration {
        let growth = TIMEOUT_GROWTH.powi(retry_count.min(64) as i32);
        Duration::try_from_secs_f64(self.timeout.as_secs_f64() * growth)
            .unwrap_or(Duration::MAX)
    }

    pub fn backoff(&self, retry_count: u32) -> Duration {
        backoff_delay(self.backoff_base, retry_count)
    }
}

/// `base * 2^retry_count`, saturating.
pub fn backoff_delay(base: Duration, retry_count: u32) -> Duration {
    base.saturating_mul(1u32 << retry_count.min(20))
}

fn lock(tracker: &Mutex<RequestTracker>) -> MutexGuard<'_, RequestTracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// == Run Chunks ==
/// Fetches every chunk of `tracker` with `fetch(index, retry_count)`.
///
/// Returns results in chunk order. The first chunk to run out of retries
/// fails the whole run; attempts still in flight at that point are dropped
/// with the run, which cancels their upstream calls. `progress` is called
/// once per completed chunk.
pub async fn run_chunks<T, F, Fut>(
    tracker: Arc<Mutex<RequestTracker>>,
    config: &SchedulerConfig,
    progress: Option<&ProgressCallback>,
    fetch: F,
) -> Result<Vec<T>>
where
    F: Fn(usize, u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let total = lock(&tracker).total();
    let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();

    let attempt = |index: usize, retry_count: u32| {
        let deadline = config.attempt_timeout(retry_count);
        let call = fetch(index, retry_count);
        async move {
            let outcome = match tokio::time::timeout(deadline, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ServiceError::Timeout(deadline.as_millis() as u64)),
            };
            (index, retry_count, outcome)
        }
    };
    let mut in_flight = FuturesUnordered::new();

    loop {
        // Fill free slots, then decide whether a backoff expiry is worth waking for
        let wake_at = {
            let mut tracker = lock(&tracker);
            if tracker.is_complete() {
                break;
            }
            let now = Instant::now();
            while let Some((index, retry_count)) = tracker.start_next(now) {
                debug!(chunk = tracker.chunk_id(index), retry_count, "chunk started");
                in_flight.push(attempt(index, retry_count));
            }
            if tracker.has_free_slot() {
                tracker.next_ready_at()
            } else {
                None
            }
        };

        let (index, retry_count, outcome) = tokio::select! {
            Some(done) = in_flight.next(), if !in_flight.is_empty() => done,
            _ = sleep_until_opt(wake_at), if wake_at.is_some() => continue,
            else => {
                return Err(ServiceError::Internal(
                    "chunk scheduler has nothing to run but is not complete".to_string(),
                ));
            }
        };

        match outcome {
            Ok(value) => {
                results[index] = Some(value);
                let percent = {
                    let mut tracker = lock(&tracker);
                    debug!(chunk = tracker.chunk_id(index), "chunk completed");
                    tracker.complete(index)
                };
                if let (Some(percent), Some(progress)) = (percent, progress) {
                    progress(percent);
                }
            }
            Err(err) => {
                let mut tracker = lock(&tracker);
                let chunk_id = tracker.chunk_id(index).to_string();
                let outcome = tracker.record_failure(
                    index,
                    config.max_retries,
                    Instant::now(),
                    config.backoff(retry_count),
                );
                match outcome {
                    Some(FailureOutcome::Retry { retry_count, .. }) => {
                        warn!(
                            chunk = %chunk_id,
                            retry_count,
                            max_retries = config.max_retries,
                            error = %err,
                            "chunk attempt failed, retrying after backoff"
                        );
                    }
                    Some(FailureOutcome::Exhausted { attempts }) => {
                        error!(chunk = %chunk_id, attempts, error = %err, "chunk failed permanently");
                        return Err(ServiceError::ChunkFailed {
                            chunk_id,
                            attempts,
                            reason: err.to_string(),
                        });
                    }
                    None => {
                        return Err(ServiceError::Internal(format!(
                            "chunk {chunk_id} finished while not in progress"
                        )));
                    }
                }
            }
        }
    }

    results
        .into_iter()
        .enumerate()
        .map(|(index, result)| {
            result.ok_or_else(|| ServiceError::Internal(format!("chunk {index} has no result")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(max_retries: u32) -> SchedulerConfig {
        SchedulerConfig {
            max_retries,
            timeout: Duration::from_secs(10),
            backoff_base: Duration::from_secs(1),
        }
    }

    fn tracker(total: usize, limit: usize) -> Arc<Mutex<RequestTracker>> {
        Arc::new(Mutex::new(RequestTracker::new("/api/x:{}", total, limit)))
    }

    #[test]
    fn test_attempt_timeout_grows() {
        let config = config(3);
        assert_eq!(config.attempt_timeout(0), Duration::from_secs(10));
        assert_eq!(config.attempt_timeout(1), Duration::from_secs(15));
        assert_eq!(config.attempt_timeout(2), Duration::from_millis(22_500));
    }

    #[test]
    fn test_attempt_timeout_saturates() {
        let unbounded = SchedulerConfig {
            timeout: Duration::MAX,
            ..config(3)
        };
        assert_eq!(unbounded.attempt_timeout(0), Duration::MAX);
        assert_eq!(unbounded.attempt_timeout(3), Duration::MAX);

        let huge = SchedulerConfig {
            timeout: Duration::from_millis(u64::MAX),
            ..config(3)
        };
        assert_eq!(huge.attempt_timeout(64), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout_still_retries() {
        let unbounded = SchedulerConfig {
            timeout: Duration::MAX,
            ..config(2)
        };
        let calls = Arc::new(AtomicUsize::new(0));

        let results = run_chunks(tracker(1, 1), &unbounded, None, |_, retry| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if retry == 0 {
                    Err(ServiceError::Internal("transient".to_string()))
                } else {
                    Ok(retry)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(results, vec![1]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_drops_running_siblings() {
        let started = Instant::now();

        let err = run_chunks(tracker(2, 2), &config(0), None, |index, _| async move {
            if index == 0 {
                Err(ServiceError::Internal("upstream down".to_string()))
            } else {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(index)
            }
        })
        .await
        .unwrap_err();

        // The failure is reported without waiting on the slow sibling
        assert!(matches!(err, ServiceError::ChunkFailed { .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_in_chunk_order() {
        // Later chunks finish first
        let results = run_chunks(tracker(4, 4), &config(0), None, |index, _| async move {
            tokio::time::sleep(Duration::from_millis(100 * (4 - index as u64))).await;
            Ok(index * 10)
        })
        .await
        .unwrap();

        assert_eq!(results, vec![0, 10, 20, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_ceiling() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = run_chunks(tracker(6, 2), &config(0), None, |index, _| {
            let running = running.clone();
            let peak = peak.clone();
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(index)
            }
        })
        .await
        .unwrap();

        assert_eq!(results.len(), 6);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure_and_grows() {
        let shared = tracker(1, 1);
        let started = Instant::now();

        // First attempt hangs past 10s, retry finishes inside the 15s deadline
        let results = run_chunks(shared.clone(), &config(1), None, |_, retry| async move {
            if retry == 0 {
                tokio::time::sleep(Duration::from_secs(60)).await;
            } else {
                tokio::time::sleep(Duration::from_secs(12)).await;
            }
            Ok(retry)
        })
        .await
        .unwrap();

        assert_eq!(results, vec![1]);
        // 10s timeout + 1s backoff + 12s second attempt
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(23));
        assert!(elapsed < Duration::from_millis(23_100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_chunk_names_itself() {
        let err = run_chunks(tracker(3, 3), &config(2), None, |index, _| async move {
            if index == 1 {
                Err(ServiceError::Internal("upstream down".to_string()))
            } else {
                Ok(index)
            }
        })
        .await
        .unwrap_err();

        assert_eq!(
            err,
            ServiceError::ChunkFailed {
                chunk_id: "/api/x:{}-chunk-1".to_string(),
                attempts: 3,
                reason: "Internal error: upstream down".to_string(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_chunks_completes_immediately() {
        let results: Vec<u8> = run_chunks(tracker(0, 1), &config(0), None, |_, _| async {
            Ok(0u8)
        })
        .await
        .unwrap();
        assert!(results.is_empty());
    }
}
