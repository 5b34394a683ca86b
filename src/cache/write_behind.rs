//! Write-Behind Queue Module
//!
//! Bounded queue of pending writes to the external tier, drained by one
//! dedicated worker task.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::backend::CacheBackend;
use crate::cache::PerformanceStatsTracker;
use crate::error::{CacheError, Result};

// == Overflow Policy ==
/// Behaviour when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Producer waits for a free slot
    Block,
    /// Oldest pending write is discarded to make room
    DropOldest,
}

impl FromStr for OverflowPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "drop_oldest" => Ok(OverflowPolicy::DropOldest),
            other => Err(CacheError::Configuration(format!(
                "unknown write-behind policy '{}' (expected block or drop_oldest)",
                other
            ))),
        }
    }
}

// == Write Op ==
/// A deferred mutation of the external tier.
#[derive(Clone, PartialEq, Eq)]
pub enum WriteOp {
    Set {
        key: String,
        value: Vec<u8>,
        ttl_seconds: u64,
    },
    Delete {
        key: String,
    },
}

impl WriteOp {
    fn key(&self) -> &str {
        match self {
            WriteOp::Set { key, .. } | WriteOp::Delete { key } => key,
        }
    }
}

impl fmt::Debug for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOp::Set { key, value, ttl_seconds } => f
                .debug_struct("Set")
                .field("key", key)
                .field("bytes", &value.len())
                .field("ttl_seconds", ttl_seconds)
                .finish(),
            WriteOp::Delete { key } => f.debug_struct("Delete").field("key", key).finish(),
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    ops: VecDeque<WriteOp>,
    in_flight: bool,
}

struct Shared {
    pending: Mutex<Pending>,
    // One permit per free slot
    space: Semaphore,
    ready: Notify,
    idle: Notify,
    closed: AtomicBool,
    policy: OverflowPolicy,
    capacity: usize,
    tracker: Arc<PerformanceStatsTracker>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// == Write-Behind Queue ==
/// Bounded write-behind queue with a dedicated drain task.
pub struct WriteBehindQueue {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for WriteBehindQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteBehindQueue")
            .field("capacity", &self.shared.capacity)
            .field("policy", &self.shared.policy)
            .field("pending", &self.pending())
            .finish()
    }
}

impl WriteBehindQueue {
    /// Starts the drain task. Must be called from within a Tokio runtime.
    pub fn spawn(
        backend: Arc<dyn CacheBackend>,
        capacity: usize,
        policy: OverflowPolicy,
        tracker: Arc<PerformanceStatsTracker>,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(CacheError::Configuration(
                "write-behind queue depth must be greater than zero".to_string(),
            ));
        }

        let shared = Arc::new(Shared {
            pending: Mutex::new(Pending::default()),
            space: Semaphore::new(capacity),
            ready: Notify::new(),
            idle: Notify::new(),
            closed: AtomicBool::new(false),
            policy,
            capacity,
            tracker,
        });

        let worker = tokio::spawn(drain(shared.clone(), backend));

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    // == Enqueue ==
    /// Queues a write. Returns false if the queue has been closed.
    ///
    /// Under `Block` this waits for a free slot; under `DropOldest` it never
    /// waits and discards the oldest pending write instead.
    pub async fn enqueue(&self, op: WriteOp) -> bool {
        if self.shared.closed.load(Ordering::Acquire) {
            return false;
        }

        match self.shared.policy {
            OverflowPolicy::Block => match self.shared.space.acquire().await {
                Ok(permit) => {
                    permit.forget();
                    self.shared.lock().ops.push_back(op);
                }
                Err(_) => return false,
            },
            OverflowPolicy::DropOldest => match self.shared.space.try_acquire() {
                Ok(permit) => {
                    permit.forget();
                    self.shared.lock().ops.push_back(op);
                }
                Err(_) => {
                    let dropped = {
                        let mut pending = self.shared.lock();
                        let dropped = pending.ops.pop_front();
                        pending.ops.push_back(op);
                        dropped
                    };
                    if let Some(dropped) = dropped {
                        self.shared.tracker.record_dropped_write();
                        warn!(key = dropped.key(), "write-behind queue full, dropped oldest write");
                    }
                }
            },
        }

        self.shared.ready.notify_one();
        true
    }

    /// Number of writes waiting to be applied.
    pub fn pending(&self) -> usize {
        self.shared.lock().ops.len()
    }

    /// Waits until every queued write has been applied.
    pub async fn flush(&self) {
        loop {
            let idle = self.shared.idle.notified();
            {
                let pending = self.shared.lock();
                if pending.ops.is_empty() && !pending.in_flight {
                    return;
                }
            }
            idle.await;
        }
    }

    // == Close ==
    /// Stops accepting writes, drains what is queued and joins the worker.
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.space.close();
        self.shared.ready.notify_one();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "write-behind worker ended abnormally");
            }
        }
    }
}

async fn drain(shared: Arc<Shared>, backend: Arc<dyn CacheBackend>) {
    debug!(
        backend = backend.name(),
        capacity = shared.capacity,
        "write-behind worker started"
    );

    loop {
        let next = {
            let mut pending = shared.lock();
            let next = pending.ops.pop_front();
            pending.in_flight = next.is_some();
            next
        };

        let op = match next {
            Some(op) => op,
            None => {
                shared.idle.notify_waiters();
                if shared.closed.load(Ordering::Acquire) {
                    break;
                }
                shared.ready.notified().await;
                continue;
            }
        };

        shared.space.add_permits(1);

        let result = match &op {
            WriteOp::Set {
                key,
                value,
                ttl_seconds,
            } => backend.set(key, value.clone(), *ttl_seconds).await,
            WriteOp::Delete { key } => backend.delete(key).await.map(|_| ()),
        };

        if let Err(e) = result {
            warn!(
                backend = backend.name(),
                key = op.key(),
                error = %e,
                "write-behind failed, value remains memory-only"
            );
        }

        shared.lock().in_flight = false;
    }

    info!(backend = backend.name(), "write-behind worker stopped");
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::remote::InMemoryRemote;

    fn set_op(key: &str) -> WriteOp {
        WriteOp::Set {
            key: key.to_string(),
            value: key.as_bytes().to_vec(),
            ttl_seconds: 0,
        }
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("block".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::Block);
        assert_eq!(
            "drop-oldest".parse::<OverflowPolicy>().unwrap(),
            OverflowPolicy::DropOldest
        );
        assert!("spill".parse::<OverflowPolicy>().is_err());
    }

    #[tokio::test]
    async fn test_writes_reach_backend() {
        let remote = Arc::new(InMemoryRemote::new());
        let tracker = Arc::new(PerformanceStatsTracker::new());
        let queue = WriteBehindQueue::spawn(remote.clone(), 4, OverflowPolicy::Block, tracker).unwrap();

        assert!(queue.enqueue(set_op("a")).await);
        assert!(queue.enqueue(set_op("b")).await);
        queue.flush().await;

        assert_eq!(remote.get("a").await.unwrap(), Some(b"a".to_vec()));
        assert_eq!(remote.write_count(), 2);

        assert!(queue.enqueue(WriteOp::Delete { key: "a".to_string() }).await);
        queue.flush().await;
        assert!(remote.get("a").await.unwrap().is_none());

        queue.close().await;
    }

    #[tokio::test]
    async fn test_close_drains_and_rejects() {
        let remote = Arc::new(InMemoryRemote::new());
        let tracker = Arc::new(PerformanceStatsTracker::new());
        let queue = WriteBehindQueue::spawn(remote.clone(), 8, OverflowPolicy::Block, tracker).unwrap();

        for key in ["a", "b", "c"] {
            queue.enqueue(set_op(key)).await;
        }
        queue.close().await;

        assert_eq!(remote.len(), 3);
        assert!(!queue.enqueue(set_op("d")).await);
    }

    #[tokio::test]
    async fn test_drop_oldest_never_exceeds_depth() {
        // current_thread runtime: the worker cannot run until we yield
        let remote = Arc::new(InMemoryRemote::new());
        let tracker = Arc::new(PerformanceStatsTracker::new());
        let queue =
            WriteBehindQueue::spawn(remote.clone(), 2, OverflowPolicy::DropOldest, tracker.clone()).unwrap();

        for key in ["a", "b", "c", "d"] {
            assert!(queue.enqueue(set_op(key)).await);
        }
        assert_eq!(queue.pending(), 2);
        assert_eq!(tracker.snapshot().dropped_writes, 2);

        queue.close().await;
        assert!(remote.get("a").await.unwrap().is_none());
        assert_eq!(remote.get("d").await.unwrap(), Some(b"d".to_vec()));
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_fatal() {
        let remote = Arc::new(InMemoryRemote::new());
        remote.set_unreachable(true);
        let tracker = Arc::new(PerformanceStatsTracker::new());
        let queue = WriteBehindQueue::spawn(remote.clone(), 2, OverflowPolicy::Block, tracker).unwrap();

        assert!(queue.enqueue(set_op("a")).await);
        queue.flush().await;
        remote.set_unreachable(false);
        assert!(queue.enqueue(set_op("b")).await);
        queue.close().await;

        assert_eq!(remote.len(), 1);
    }
}
