//! Eviction Policy Module
//!
//! Pluggable strategies deciding which entries leave the memory tier when it
//! runs over capacity. Policies only select victims; the store removes them.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

// == Eviction Strategy ==
/// Named eviction strategies selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionStrategy {
    /// Least recently used first
    Lru,
    /// Least frequently used first
    Lfu,
    /// Expired entries only
    Ttl,
    /// TTL sweep, then LRU
    Hybrid,
}

impl EvictionStrategy {
    /// Builds the policy implementing this strategy.
    pub fn policy(self) -> Box<dyn EvictionPolicy> {
        match self {
            EvictionStrategy::Lru => Box::new(LruPolicy),
            EvictionStrategy::Lfu => Box::new(LfuPolicy),
            EvictionStrategy::Ttl => Box::new(TtlPolicy),
            EvictionStrategy::Hybrid => Box::new(HybridPolicy),
        }
    }
}

impl FromStr for EvictionStrategy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionStrategy::Lru),
            "lfu" => Ok(EvictionStrategy::Lfu),
            "ttl" => Ok(EvictionStrategy::Ttl),
            "hybrid" => Ok(EvictionStrategy::Hybrid),
            other => Err(CacheError::Configuration(format!(
                "unknown eviction strategy '{}' (expected lru, lfu, ttl or hybrid)",
                other
            ))),
        }
    }
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionStrategy::Lru => "lru",
            EvictionStrategy::Lfu => "lfu",
            EvictionStrategy::Ttl => "ttl",
            EvictionStrategy::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

// == Eviction ==
/// Why an entry was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// TTL elapsed
    Expired,
    /// Removed to make room
    Capacity,
}

/// A key selected for removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    pub key: String,
    pub reason: EvictionReason,
}

// == Eviction Policy ==
/// Chooses which entries to remove when `current_size > max_size`.
///
/// Implementations never fail. Returning an empty list is a valid answer and
/// leaves the store over capacity until a later delete or expiry.
pub trait EvictionPolicy: Send + Sync + fmt::Debug {
    /// Strategy name for logging.
    fn name(&self) -> &'static str;

    /// Selects victims in removal order.
    ///
    /// `protected` names an entry that must not be selected (the one whose
    /// insertion triggered the sweep).
    fn select_victims(
        &self,
        entries: &HashMap<String, CacheEntry>,
        current_size: usize,
        max_size: usize,
        now: u64,
        protected: Option<&str>,
    ) -> Vec<Eviction>;
}

/// Least recently used.
#[derive(Debug, Clone, Copy, Default)]
pub struct LruPolicy;

/// Least frequently used, recency breaks ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct LfuPolicy;

/// Expiry only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TtlPolicy;

/// Expiry sweep, then LRU over what is left.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridPolicy;

impl EvictionPolicy for LruPolicy {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn select_victims(
        &self,
        entries: &HashMap<String, CacheEntry>,
        current_size: usize,
        max_size: usize,
        _now: u64,
        protected: Option<&str>,
    ) -> Vec<Eviction> {
        let mut candidates = candidates(entries, protected, &HashSet::new());
        candidates.sort_by_key(|e| (e.last_accessed_at, e.access_tick));
        evict_until_fits(candidates, current_size, max_size)
    }
}

impl EvictionPolicy for LfuPolicy {
    fn name(&self) -> &'static str {
        "lfu"
    }

    fn select_victims(
        &self,
        entries: &HashMap<String, CacheEntry>,
        current_size: usize,
        max_size: usize,
        _now: u64,
        protected: Option<&str>,
    ) -> Vec<Eviction> {
        let mut candidates = candidates(entries, protected, &HashSet::new());
        candidates.sort_by_key(|e| (e.access_count, e.last_accessed_at, e.access_tick));
        evict_until_fits(candidates, current_size, max_size)
    }
}

impl EvictionPolicy for TtlPolicy {
    fn name(&self) -> &'static str {
        "ttl"
    }

    fn select_victims(
        &self,
        entries: &HashMap<String, CacheEntry>,
        _current_size: usize,
        _max_size: usize,
        now: u64,
        protected: Option<&str>,
    ) -> Vec<Eviction> {
        expired(entries, now, protected)
    }
}

impl EvictionPolicy for HybridPolicy {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn select_victims(
        &self,
        entries: &HashMap<String, CacheEntry>,
        current_size: usize,
        max_size: usize,
        now: u64,
        protected: Option<&str>,
    ) -> Vec<Eviction> {
        let mut victims = expired(entries, now, protected);
        let freed: usize = victims
            .iter()
            .filter_map(|v| entries.get(&v.key))
            .map(|e| e.size_bytes)
            .sum();
        let remaining = current_size.saturating_sub(freed);

        if remaining > max_size {
            let skip: HashSet<&str> = victims.iter().map(|v| v.key.as_str()).collect();
            let mut live = candidates(entries, protected, &skip);
            live.sort_by_key(|e| (e.last_accessed_at, e.access_tick));
            let more = evict_until_fits(live, remaining, max_size);
            victims.extend(more);
        }

        victims
    }
}

// == Helpers ==
fn candidates<'a>(
    entries: &'a HashMap<String, CacheEntry>,
    protected: Option<&str>,
    skip: &HashSet<&str>,
) -> Vec<&'a CacheEntry> {
    entries
        .values()
        .filter(|e| Some(e.key.as_str()) != protected && !skip.contains(e.key.as_str()))
        .collect()
}

fn expired(
    entries: &HashMap<String, CacheEntry>,
    now: u64,
    protected: Option<&str>,
) -> Vec<Eviction> {
    let mut expired: Vec<&CacheEntry> = entries
        .values()
        .filter(|e| Some(e.key.as_str()) != protected && e.is_expired_at(now))
        .collect();
    // Oldest first keeps the order deterministic for logging and tests
    expired.sort_by_key(|e| (e.created_at, e.access_tick));
    expired
        .into_iter()
        .map(|e| Eviction {
            key: e.key.clone(),
            reason: EvictionReason::Expired,
        })
        .collect()
}

fn evict_until_fits(
    ordered: Vec<&CacheEntry>,
    mut current_size: usize,
    max_size: usize,
) -> Vec<Eviction> {
    let mut victims = Vec::new();
    for entry in ordered {
        if current_size <= max_size {
            break;
        }
        current_size = current_size.saturating_sub(entry.size_bytes);
        victims.push(Eviction {
            key: entry.key.clone(),
            reason: EvictionReason::Capacity,
        });
    }
    victims
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_000_000;

    fn entry(key: &str, size: usize, ttl: u64, created_at: u64, accessed: u64, count: u64) -> CacheEntry {
        let mut e = CacheEntry::with_created_at(key, vec![0u8; size], ttl, created_at, accessed);
        e.last_accessed_at = accessed;
        e.access_count = count;
        e
    }

    fn map(entries: Vec<CacheEntry>) -> HashMap<String, CacheEntry> {
        entries.into_iter().map(|e| (e.key.clone(), e)).collect()
    }

    fn keys(victims: &[Eviction]) -> Vec<&str> {
        victims.iter().map(|v| v.key.as_str()).collect()
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("LRU".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Lru);
        assert_eq!(" lfu ".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Lfu);
        assert_eq!("hybrid".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Hybrid);
        assert!(matches!(
            "fifo".parse::<EvictionStrategy>(),
            Err(CacheError::Configuration(_))
        ));
    }

    #[test]
    fn test_lru_evicts_oldest_access_first() {
        let entries = map(vec![
            entry("a", 10, 0, NOW, NOW + 3, 0),
            entry("b", 10, 0, NOW, NOW + 1, 5),
            entry("c", 10, 0, NOW, NOW + 2, 0),
        ]);

        let victims = LruPolicy.select_victims(&entries, 30, 20, NOW + 10, None);
        assert_eq!(keys(&victims), vec!["b"]);
        assert_eq!(victims[0].reason, EvictionReason::Capacity);
    }

    #[test]
    fn test_lfu_evicts_least_counted_first() {
        let entries = map(vec![
            entry("a", 10, 0, NOW, NOW + 1, 9),
            entry("b", 10, 0, NOW, NOW + 2, 1),
            entry("c", 10, 0, NOW, NOW + 3, 4),
        ]);

        let victims = LfuPolicy.select_victims(&entries, 30, 10, NOW + 10, None);
        assert_eq!(keys(&victims), vec!["b", "c"]);
    }

    #[test]
    fn test_ttl_never_evicts_live_entries() {
        let entries = map(vec![
            entry("old", 10, 1, NOW - 5_000, NOW - 5_000, 0),
            entry("live", 10, 100, NOW, NOW, 0),
        ]);

        let victims = TtlPolicy.select_victims(&entries, 20, 5, NOW, None);
        assert_eq!(keys(&victims), vec!["old"]);
        assert_eq!(victims[0].reason, EvictionReason::Expired);
    }

    #[test]
    fn test_hybrid_prefers_expired_over_lru() {
        // "stale" was read most recently but has expired; "cold" is live but LRU
        let entries = map(vec![
            entry("cold", 10, 100, NOW - 4_000, NOW - 4_000, 0),
            entry("stale", 10, 1, NOW - 3_000, NOW - 1, 3),
            entry("new", 10, 100, NOW, NOW, 0),
        ]);

        let victims = HybridPolicy.select_victims(&entries, 30, 20, NOW, Some("new"));
        assert_eq!(keys(&victims), vec!["stale"]);
    }

    #[test]
    fn test_hybrid_falls_back_to_lru() {
        let entries = map(vec![
            entry("stale", 10, 1, NOW - 3_000, NOW - 3_000, 0),
            entry("cold", 10, 0, NOW, NOW + 1, 0),
            entry("warm", 10, 0, NOW, NOW + 2, 0),
            entry("new", 10, 0, NOW, NOW + 3, 0),
        ]);

        let victims = HybridPolicy.select_victims(&entries, 40, 20, NOW + 5, Some("new"));
        assert_eq!(keys(&victims), vec!["stale", "cold"]);
        assert_eq!(victims[1].reason, EvictionReason::Capacity);
    }

    #[test]
    fn test_protected_entry_never_selected() {
        let entries = map(vec![entry("huge", 100, 0, NOW, NOW, 0)]);

        let victims = LruPolicy.select_victims(&entries, 100, 10, NOW, Some("huge"));
        assert!(victims.is_empty());
    }

    #[test]
    fn test_same_millisecond_ordered_by_tick() {
        let mut first = entry("first", 10, 0, NOW, NOW, 0);
        first.access_tick = 1;
        let mut second = entry("second", 10, 0, NOW, NOW, 0);
        second.access_tick = 2;
        let entries = map(vec![second, first]);

        let victims = LruPolicy.select_victims(&entries, 20, 10, NOW, None);
        assert_eq!(keys(&victims), vec!["first"]);
    }
}
