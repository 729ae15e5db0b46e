//! In-process lock store and job queue.
//!
//! First-class implementations, not test stubs: a single-process
//! deployment coordinates correctly through these, and every concurrency
//! test in the pipeline crates runs against them. Semantics mirror the
//! Redis implementations exactly.

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use sniper_core::{LockStore, SnipeError};

use crate::queue::{BuyJob, JobQueue};

#[derive(Debug, Clone)]
struct LockEntry {
    holder: String,
    expires_at: Instant,
}

/// Mutex-guarded map with per-key expiry. Expired entries are reclaimed
/// lazily on the next touch, which matches Redis TTL behavior closely
/// enough for every caller here.
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    entries: Mutex<HashMap<String, LockEntry>>,
}

impl MemoryLockStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn try_acquire(
        &self,
        key: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, SnipeError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if let Some(existing) = entries.get(key) {
            if existing.expires_at > now {
                return Ok(false);
            }
        }
        entries.insert(
            key.to_string(),
            LockEntry {
                holder: holder.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release(&self, key: &str, holder: &str) -> Result<(), SnipeError> {
        let mut entries = self.entries.lock().await;
        if entries
            .get(key)
            .is_some_and(|entry| entry.holder == holder)
        {
            entries.remove(key);
        }
        Ok(())
    }

    async fn holder(&self, key: &str) -> Result<Option<String>, SnipeError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.holder.clone()))
    }
}

#[derive(Debug)]
struct QueuedJob {
    priority: i64,
    seq: u64,
    job: BuyJob,
}

// BinaryHeap is a max-heap; invert the ordering so the lowest priority
// number (and then the earliest arrival) pops first.
impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedJob {}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<QueuedJob>,
    queued_ids: HashSet<String>,
    next_seq: u64,
}

/// Priority heap under a mutex with job-id deduplication.
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    state: Mutex<QueueState>,
}

impl MemoryJobQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &BuyJob) -> Result<bool, SnipeError> {
        let mut state = self.state.lock().await;
        if !state.queued_ids.insert(job.job_id.clone()) {
            return Ok(false);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(QueuedJob {
            priority: job.priority,
            seq,
            job: job.clone(),
        });
        Ok(true)
    }

    async fn claim(&self) -> Result<Option<BuyJob>, SnipeError> {
        let mut state = self.state.lock().await;
        let Some(queued) = state.heap.pop() else {
            return Ok(None);
        };
        state.queued_ids.remove(&queued.job.job_id);
        Ok(Some(queued.job))
    }

    async fn depth(&self) -> Result<usize, SnipeError> {
        Ok(self.state.lock().await.heap.len())
    }
}
