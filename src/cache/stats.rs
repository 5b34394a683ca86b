//! Cache Statistics Module
//!
//! Cumulative performance counters shared by the cache store and the batch
//! orchestrator, plus the snapshot types handed out to callers.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time view of the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries currently held in memory
    pub total_items: usize,
    /// Bytes currently held in memory
    pub total_size_bytes: usize,
    /// Configured memory capacity
    pub max_size_bytes: usize,
    /// Successful lookups
    pub hit_count: u64,
    /// Failed lookups (not found or expired)
    pub miss_count: u64,
    /// hits / (hits + misses)
    pub hit_rate: f64,
    /// Entries removed for capacity
    pub eviction_count: u64,
    /// Entries removed because their TTL elapsed
    pub expired_count: u64,
    /// total_size_bytes / max_size_bytes * 100
    pub memory_usage_percent: f64,
}

// == Performance Snapshot ==
/// Read-only copy of the tracker counters with derived rates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub expirations: u64,
    /// Bytes accepted by successful `set` calls
    pub total_bytes: u64,
    pub batches: u64,
    pub parallel_batches: u64,
    /// Requests seen across all batches
    pub total_items: u64,
    /// Requests that went to a generator
    pub generated_items: u64,
    pub failed_items: u64,
    /// Wall time spent in batch calls
    pub total_time_secs: f64,
    /// total_items / total_time_secs
    pub throughput: f64,
    /// Pending writes discarded by the write-behind queue
    pub dropped_writes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    total_bytes: u64,
    batches: u64,
    parallel_batches: u64,
    total_items: u64,
    generated_items: u64,
    failed_items: u64,
    total_time: Duration,
    dropped_writes: u64,
}

/// Summary of one finished batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchRecord {
    pub items: usize,
    pub generated: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub parallel: bool,
}

// == Performance Stats Tracker ==
/// Cumulative counters observed by every cache and orchestrator operation.
///
/// All updates take one short-lived mutex, never held across an await.
#[derive(Debug, Default)]
pub struct PerformanceStatsTracker {
    counters: Mutex<Counters>,
}

impl PerformanceStatsTracker {
    // == Constructor ==
    /// Creates a tracker with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        // Counters stay meaningful even if a holder panicked mid-update
        self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Increments the hit counter.
    pub fn record_hit(&self) {
        self.lock().hits += 1;
    }

    /// Increments the miss counter.
    pub fn record_miss(&self) {
        self.lock().misses += 1;
    }

    /// Adds capacity evictions and TTL expirations.
    pub fn record_evictions(&self, evicted: u64, expired: u64) {
        let mut counters = self.lock();
        counters.evictions += evicted;
        counters.expirations += expired;
    }

    /// Adds bytes accepted by a write.
    pub fn record_write(&self, bytes: usize) {
        self.lock().total_bytes += bytes as u64;
    }

    /// Counts a write-behind operation discarded under overflow.
    pub fn record_dropped_write(&self) {
        self.lock().dropped_writes += 1;
    }

    /// Folds a finished batch into the totals.
    pub fn record_batch(&self, batch: BatchRecord) {
        let mut counters = self.lock();
        counters.batches += 1;
        if batch.parallel {
            counters.parallel_batches += 1;
        }
        counters.total_items += batch.items as u64;
        counters.generated_items += batch.generated as u64;
        counters.failed_items += batch.failed as u64;
        counters.total_time += batch.elapsed;
    }

    // == Snapshot ==
    /// Returns a copy of the counters with derived rates.
    pub fn snapshot(&self) -> PerformanceSnapshot {
        let c = self.lock();
        let total_time_secs = c.total_time.as_secs_f64();
        PerformanceSnapshot {
            hits: c.hits,
            misses: c.misses,
            hit_rate: hit_rate(c.hits, c.misses),
            evictions: c.evictions,
            expirations: c.expirations,
            total_bytes: c.total_bytes,
            batches: c.batches,
            parallel_batches: c.parallel_batches,
            total_items: c.total_items,
            generated_items: c.generated_items,
            failed_items: c.failed_items,
            total_time_secs,
            throughput: if total_time_secs > 0.0 {
                c.total_items as f64 / total_time_secs
            } else {
                0.0
            },
            dropped_writes: c.dropped_writes,
        }
    }

    /// Builds the cache view from the counters and the memory tier's size.
    pub fn cache_stats(&self, total_items: usize, total_size_bytes: usize, max_size_bytes: usize) -> CacheStats {
        let c = self.lock();
        CacheStats {
            total_items,
            total_size_bytes,
            max_size_bytes,
            hit_count: c.hits,
            miss_count: c.misses,
            hit_rate: hit_rate(c.hits, c.misses),
            eviction_count: c.evictions,
            expired_count: c.expirations,
            memory_usage_percent: memory_usage_percent(total_size_bytes, max_size_bytes),
        }
    }
}

// == Derived Rates ==
/// hits / (hits + misses), or 0.0 if no lookups have been made.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// current / max * 100, or 0.0 for a zero capacity.
pub fn memory_usage_percent(current: usize, max: usize) -> f64 {
    if max == 0 {
        0.0
    } else {
        current as f64 / max as f64 * 100.0
    }
}
