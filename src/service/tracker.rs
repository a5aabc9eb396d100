//! Request Tracker Module
//!
//! Bookkeeping for one in-flight logical fetch: which chunks are waiting,
//! running, done or dead. Each chunk sits in exactly one of those places at
//! any time, and never more than `concurrency_limit` chunks are running.

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

// == Chunk State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

// == Chunk Task ==
/// One chunk of a logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkTask {
    /// `{cache_key}-chunk-{n}`
    pub id: String,
    pub state: ChunkState,
    /// Failed attempts so far
    pub retry_count: u32,
}

/// Result of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back in the queue, eligible again at `ready_at`
    Retry { retry_count: u32, ready_at: Instant },
    /// Out of retries; the chunk is now `Failed`
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy)]
struct Queued {
    index: usize,
    /// None = eligible immediately
    ready_at: Option<Instant>,
}

// == Request Tracker ==
#[derive(Debug)]
pub struct RequestTracker {
    tasks: Vec<ChunkTask>,
    pending: VecDeque<Queued>,
    in_progress: BTreeSet<usize>,
    completed: BTreeSet<usize>,
    failed: BTreeSet<usize>,
    concurrency_limit: usize,
}

impl RequestTracker {
    // == Constructor ==
    /// Registers `total` chunks for `key`, all pending in index order.
    /// A `concurrency_limit` of zero is raised to one.
    pub fn new(key: &str, total: usize, concurrency_limit: usize) -> Self {
        let tasks = (0..total)
            .map(|n| ChunkTask {
                id: format!("{key}-chunk-{n}"),
                state: ChunkState::Pending,
                retry_count: 0,
            })
            .collect();
        let pending = (0..total)
            .map(|index| Queued {
                index,
                ready_at: None,
            })
            .collect();

        Self {
            tasks,
            pending,
            in_progress: BTreeSet::new(),
            completed: BTreeSet::new(),
            failed: BTreeSet::new(),
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    pub fn task(&self, index: usize) -> Option<&ChunkTask> {
        self.tasks.get(index)
    }

    pub fn chunk_id(&self, index: usize) -> &str {
        self.tasks.get(index).map(|t| t.id.as_str()).unwrap_or_default()
    }

    pub fn in_progress_count(&self) -> usize {
        self.in_progress.len()
    }

    pub fn has_free_slot(&self) -> bool {
        self.in_progress.len() < self.concurrency_limit
    }

    pub fn is_complete(&self) -> bool {
        self.completed.len() == self.tasks.len()
    }

    /// Percentage of chunks completed.
    pub fn progress(&self) -> f64 {
        if self.tasks.is_empty() {
            return 100.0;
        }
        self.completed.len() as f64 / self.tasks.len() as f64 * 100.0
    }

    // == Start Next ==
    /// Moves the first chunk in queue order that is eligible at `now` into
    /// the in-progress set. Returns its index and retry count, or None when
    /// no slot is free or nothing is eligible yet.
    pub fn start_next(&mut self, now: Instant) -> Option<(usize, u32)> {
        if !self.has_free_slot() {
            return None;
        }

        let position = self
            .pending
            .iter()
            .position(|q| q.ready_at.map_or(true, |at| at <= now))?;
        let queued = self.pending.remove(position)?;

        let task = &mut self.tasks[queued.index];
        task.state = ChunkState::InProgress;
        self.in_progress.insert(queued.index);

        debug_assert!(self.in_progress.len() <= self.concurrency_limit);
        Some((queued.index, task.retry_count))
    }

    // == Complete ==
    /// Marks an in-progress chunk completed. Returns the new progress, or
    /// None if the chunk was not in progress.
    pub fn complete(&mut self, index: usize) -> Option<f64> {
        if !self.in_progress.remove(&index) {
            return None;
        }
        self.tasks[index].state = ChunkState::Completed;
        self.completed.insert(index);
        Some(self.progress())
    }

    // == Record Failure ==
    /// Handles a failed attempt of an in-progress chunk.
    ///
    /// With retries left the chunk goes to the back of the queue and becomes
    /// eligible after `backoff`; otherwise it moves to the failed set.
    pub fn record_failure(
        &mut self,
        index: usize,
        max_retries: u32,
        now: Instant,
        backoff: Duration,
    ) -> Option<FailureOutcome> {
        if !self.in_progress.remove(&index) {
            return None;
        }
        let task = &mut self.tasks[index];

        if task.retry_count < max_retries {
            task.retry_count += 1;
            task.state = ChunkState::Pending;
            let ready_at = now + backoff;
            self.pending.push_back(Queued {
                index,
                ready_at: Some(ready_at),
            });
            Some(FailureOutcome::Retry {
                retry_count: task.retry_count,
                ready_at,
            })
        } else {
            task.state = ChunkState::Failed;
            self.failed.insert(index);
            Some(FailureOutcome::Exhausted {
                attempts: task.retry_count + 1,
            })
        }
    }

    /// Earliest instant a backed-off pending chunk becomes eligible.
    pub fn next_ready_at(&self) -> Option<Instant> {
        self.pending.iter().filter_map(|q| q.ready_at).min()
    }

    // == Snapshot ==
    pub fn snapshot(&self) -> TrackerSnapshot {
        let ids = |set: &BTreeSet<usize>| -> Vec<String> {
            set.iter().map(|&i| self.tasks[i].id.clone()).collect()
        };
        TrackerSnapshot {
            chunk_ids: self.tasks.iter().map(|t| t.id.clone()).collect(),
            pending: self
                .pending
                .iter()
                .map(|q| self.tasks[q.index].id.clone())
                .collect(),
            in_progress: ids(&self.in_progress),
            completed: ids(&self.completed),
            failed: ids(&self.failed),
            concurrency_limit: self.concurrency_limit,
            progress: self.progress(),
        }
    }

    /// Checks that every chunk is in exactly one place and that its state
    /// matches that place.
    pub fn is_consistent(&self) -> bool {
        let mut seen = vec![0u8; self.tasks.len()];
        let queued = self.pending.iter().map(|q| (q.index, ChunkState::Pending));
        let running = self.in_progress.iter().map(|&i| (i, ChunkState::InProgress));
        let done = self.completed.iter().map(|&i| (i, ChunkState::Completed));
        let dead = self.failed.iter().map(|&i| (i, ChunkState::Failed));

        for (index, state) in queued.chain(running).chain(done).chain(dead) {
            if self.tasks[index].state != state {
                return false;
            }
            seen[index] += 1;
        }
        seen.iter().all(|&n| n == 1) && self.in_progress.len() <= self.concurrency_limit
    }
}

// == Tracker Snapshot ==
/// Point-in-time view of a tracker, by chunk id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerSnapshot {
    pub chunk_ids: Vec<String>,
    pub pending: Vec<String>,
    pub in_progress: Vec<String>,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    pub concurrency_limit: usize,
    pub progress: f64,
}
