//! Memory Backend Module
//!
//! In-process entry map with byte-capacity enforcement. The entry map, the
//! running size counter and the logical access clock share one mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{CacheEntry, EvictionPolicy, EvictionReason, EvictionStrategy, PerformanceStatsTracker};
use crate::error::{CacheError, Result};

// == Lookup ==
/// Outcome of a memory read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Live entry; carries a copy of the value
    Hit(Vec<u8>),
    /// Entry was present but expired and has been removed
    Expired,
    /// No entry under this key
    Missing,
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, CacheEntry>,
    current_size: usize,
    tick: u64,
}

impl MemoryState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.current_size = self.current_size.saturating_sub(entry.size_bytes);
        Some(entry)
    }
}

// == Memory Backend ==
/// Byte-bounded in-memory tier with a pluggable eviction policy.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    policy: Box<dyn EvictionPolicy>,
    max_size_bytes: usize,
    tracker: Arc<PerformanceStatsTracker>,
}

impl MemoryBackend {
    // == Constructor ==
    /// Creates an empty memory tier.
    ///
    /// Fails with a configuration error when `max_size_bytes` is zero.
    pub fn new(
        max_size_bytes: usize,
        strategy: EvictionStrategy,
        tracker: Arc<PerformanceStatsTracker>,
    ) -> Result<Self> {
        if max_size_bytes == 0 {
            return Err(CacheError::Configuration(
                "max_size_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            state: Mutex::new(MemoryState::default()),
            policy: strategy.policy(),
            max_size_bytes,
            tracker,
        })
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // == Get ==
    /// Reads an entry, updating its access metadata on a hit.
    ///
    /// Expired entries are removed on the spot. Hit/miss counting is left to
    /// the caller so a hybrid lookup is counted once.
    pub fn get(&self, key: &str) -> Lookup {
        let now = current_timestamp_ms();
        let mut state = self.lock();

        let expired = match state.entries.get(key) {
            None => return Lookup::Missing,
            Some(entry) => entry.is_expired_at(now),
        };

        if expired {
            state.remove(key);
            drop(state);
            self.tracker.record_evictions(0, 1);
            return Lookup::Expired;
        }

        let tick = state.next_tick();
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.touch(now, tick);
                Lookup::Hit(entry.value.clone())
            }
            None => Lookup::Missing,
        }
    }

    // == Insert ==
    /// Stores a value and runs the eviction policy if over capacity.
    ///
    /// The inserted entry itself is never chosen as a victim, so a single
    /// value larger than the whole capacity stays resident on its own.
    pub fn insert(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) {
        self.insert_entry(key, value, ttl_seconds, None);
    }

    /// Stores a value whose age is already known (e.g. loaded from disk).
    pub fn insert_with_created_at(&self, key: &str, value: Vec<u8>, ttl_seconds: u64, created_at: u64) {
        self.insert_entry(key, value, ttl_seconds, Some(created_at));
    }

    fn insert_entry(&self, key: &str, value: Vec<u8>, ttl_seconds: u64, created_at: Option<u64>) {
        let now = current_timestamp_ms();
        let mut state = self.lock();

        state.remove(key);
        let tick = state.next_tick();
        let mut entry = match created_at {
            Some(created_at) => CacheEntry::with_created_at(key, value, ttl_seconds, created_at, tick),
            None => CacheEntry::with_created_at(key, value, ttl_seconds, now, tick),
        };
        entry.last_accessed_at = now;
        state.current_size += entry.size_bytes;
        state.entries.insert(key.to_string(), entry);

        if state.current_size <= self.max_size_bytes {
            return;
        }

        let victims = self.policy.select_victims(
            &state.entries,
            state.current_size,
            self.max_size_bytes,
            now,
            Some(key),
        );

        let mut evicted = 0u64;
        let mut expired = 0u64;
        for victim in &victims {
            if state.remove(&victim.key).is_some() {
                match victim.reason {
                    EvictionReason::Capacity => evicted += 1,
                    EvictionReason::Expired => expired += 1,
                }
            }
        }

        let current_size = state.current_size;
        drop(state);

        self.tracker.record_evictions(evicted, expired);
        debug!(
            policy = self.policy.name(),
            evicted,
            expired,
            current_size,
            max_size = self.max_size_bytes,
            "eviction sweep"
        );
        if current_size > self.max_size_bytes {
            debug!(
                current_size,
                max_size = self.max_size_bytes,
                "memory tier still over capacity, nothing left to evict"
            );
        }
    }

    // == Delete ==
    /// Removes an entry. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    // == Exists ==
    /// Checks for a live entry without touching access metadata.
    pub fn exists(&self, key: &str) -> bool {
        let now = current_timestamp_ms();
        let mut state = self.lock();
        let expired = match state.entries.get(key) {
            None => return false,
            Some(entry) => entry.is_expired_at(now),
        };
        if expired {
            state.remove(key);
            drop(state);
            self.tracker.record_evictions(0, 1);
            return false;
        }
        true
    }

    // == Clear ==
    /// Drops every entry and resets the size counter.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.current_size = 0;
    }

    // == Cleanup Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let mut state = self.lock();

        let expired_keys: Vec<String> = state
            .entries
            .values()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &expired_keys {
            state.remove(key);
        }
        drop(state);

        if !expired_keys.is_empty() {
            self.tracker.record_evictions(0, expired_keys.len() as u64);
        }
        expired_keys.len()
    }

    /// Returns a copy of an entry without counting an access.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.lock().entries.get(key).cloned()
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns true if no entries are held.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Bytes currently held.
    pub fn size_bytes(&self) -> usize {
        self.lock().current_size
    }

    /// Entry count and byte size read under one lock.
    pub fn usage(&self) -> (usize, usize) {
        let state = self.lock();
        (state.entries.len(), state.current_size)
    }

    /// Configured capacity.
    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    fn backend(max: usize, strategy: EvictionStrategy) -> MemoryBackend {
        MemoryBackend::new(max, strategy, Arc::new(PerformanceStatsTracker::new())).unwrap()
    }

    #[test]
    fn test_zero_capacity_is_configuration_error() {
        let result = MemoryBackend::new(0, EvictionStrategy::Lru, Arc::new(PerformanceStatsTracker::new()));
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[test]
    fn test_insert_and_get() {
        let memory = backend(100, EvictionStrategy::Lru);
        memory.insert("k", b"value".to_vec(), 0);

        assert_eq!(memory.get("k"), Lookup::Hit(b"value".to_vec()));
        assert_eq!(memory.size_bytes(), 5);
        assert_eq!(memory.get("missing"), Lookup::Missing);
    }

    #[test]
    fn test_overwrite_adjusts_size() {
        let memory = backend(100, EvictionStrategy::Lru);
        memory.insert("k", vec![0; 40], 0);
        memory.insert("k", vec![0; 10], 0);

        assert_eq!(memory.len(), 1);
        assert_eq!(memory.size_bytes(), 10);
    }

    #[test]
    fn test_get_touches_entry() {
        let memory = backend(100, EvictionStrategy::Lru);
        memory.insert("k", b"v".to_vec(), 0);

        memory.get("k");
        memory.get("k");

        let entry = memory.peek("k").unwrap();
        assert_eq!(entry.access_count, 2);
        assert_eq!(entry.value, b"v");
    }

    #[test]
    fn test_expired_entry_removed_on_get() {
        let memory = backend(100, EvictionStrategy::Lru);
        memory.insert("k", b"v".to_vec(), 1);

        sleep(Duration::from_millis(1100));

        assert_eq!(memory.get("k"), Lookup::Expired);
        assert!(memory.is_empty());
        assert_eq!(memory.size_bytes(), 0);
    }

    #[test]
    fn test_oversized_entry_stays_alone() {
        let memory = backend(15, EvictionStrategy::Lru);
        memory.insert("small", vec![0; 5], 0);
        memory.insert("huge", vec![0; 50], 0);

        assert_eq!(memory.len(), 1);
        assert!(memory.exists("huge"));
        assert_eq!(memory.size_bytes(), 50);
    }

    #[test]
    fn test_ttl_strategy_never_evicts_live() {
        let memory = backend(15, EvictionStrategy::Ttl);
        memory.insert("a", vec![0; 10], 100);
        memory.insert("b", vec![0; 10], 100);

        assert_eq!(memory.len(), 2);
        assert_eq!(memory.size_bytes(), 20);
    }

    #[test]
    fn test_lfu_keeps_frequently_read() {
        let memory = backend(25, EvictionStrategy::Lfu);
        memory.insert("hot", vec![0; 10], 0);
        memory.insert("cold", vec![0; 10], 0);
        memory.get("hot");
        memory.get("hot");
        memory.get("cold");
        // "cold" has one read, "hot" two: cold goes first even though it is more recent
        memory.insert("new", vec![0; 10], 0);

        assert!(memory.exists("hot"));
        assert!(!memory.exists("cold"));
        assert!(memory.exists("new"));
    }

    #[test]
    fn test_cleanup_expired() {
        let memory = backend(100, EvictionStrategy::Lru);
        memory.insert("short", b"v".to_vec(), 1);
        memory.insert("long", b"v".to_vec(), 100);

        sleep(Duration::from_millis(1100));

        assert_eq!(memory.cleanup_expired(), 1);
        assert_eq!(memory.len(), 1);
        assert!(memory.exists("long"));
    }

    #[test]
    fn test_clear_resets_size() {
        let memory = backend(100, EvictionStrategy::Lru);
        memory.insert("a", vec![0; 30], 0);
        memory.clear();

        assert!(memory.is_empty());
        assert_eq!(memory.size_bytes(), 0);
    }
}
