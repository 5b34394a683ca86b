//! Cache Store Module
//!
//! Main cache engine. Fronts a memory tier, an external tier, or both, and
//! records every lookup in the shared performance tracker.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::backend::CacheBackend;
use crate::cache::disk::DiskBackend;
use crate::cache::memory::{Lookup, MemoryBackend};
use crate::cache::remote::HttpRemoteBackend;
use crate::cache::write_behind::{WriteBehindQueue, WriteOp};
use crate::cache::entry::current_timestamp_ms;
use crate::cache::{CacheEntry, CacheStats, EvictionStrategy, PerformanceStatsTracker};
use crate::config::{BackendKind, Config, RemoteTarget};
use crate::error::{CacheError, Result};

const REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

// == Tiers ==
enum Tiers {
    Memory(MemoryBackend),
    Remote(Arc<dyn CacheBackend>),
    Hybrid {
        memory: MemoryBackend,
        remote: Arc<dyn CacheBackend>,
        write_behind: WriteBehindQueue,
    },
}

impl Tiers {
    fn memory(&self) -> Option<&MemoryBackend> {
        match self {
            Tiers::Memory(memory) | Tiers::Hybrid { memory, .. } => Some(memory),
            Tiers::Remote(_) => None,
        }
    }

    fn remote_name(&self) -> &'static str {
        match self {
            Tiers::Memory(_) => "none",
            Tiers::Remote(remote) | Tiers::Hybrid { remote, .. } => remote.name(),
        }
    }
}

// == Cache Store ==
/// Cache with a memory tier, an external tier, or a hybrid of both.
///
/// Hybrid degradation: when the external tier fails, the call is answered
/// from memory alone (a read becomes a miss, a write stays memory-only) and a
/// warning naming the key and error is logged.
pub struct CacheStore {
    tiers: Tiers,
    default_ttl: u64,
    repopulate_ttl: u64,
    max_size_bytes: usize,
    tracker: Arc<PerformanceStatsTracker>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("kind", &self.kind())
            .field("remote", &self.tiers.remote_name())
            .field("default_ttl", &self.default_ttl)
            .field("max_size_bytes", &self.max_size_bytes)
            .finish()
    }
}

impl CacheStore {
    // == Constructors ==
    /// Opens a store from configuration, building the external tier it names.
    ///
    /// Hybrid stores start their write-behind worker here, so this must run
    /// inside a Tokio runtime for that layout.
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;

        let remote: Option<Arc<dyn CacheBackend>> = match (&config.backend, &config.remote) {
            (BackendKind::Memory, _) | (_, None) => None,
            (_, Some(RemoteTarget::Http(url))) => {
                Some(Arc::new(HttpRemoteBackend::new(url.clone(), REMOTE_TIMEOUT)?))
            }
            (_, Some(RemoteTarget::Disk(dir))) => Some(Arc::new(DiskBackend::open(dir)?)),
        };

        Self::with_remote(config, remote)
    }

    /// Opens a store with an injected external tier (used by tests and
    /// embedders with their own backend).
    pub fn with_remote(config: &Config, remote: Option<Arc<dyn CacheBackend>>) -> Result<Self> {
        config.validate()?;

        let tracker = Arc::new(PerformanceStatsTracker::new());
        let missing_remote = || {
            CacheError::Configuration(format!(
                "{:?} backend requires an external tier",
                config.backend
            ))
        };

        let tiers = match config.backend {
            BackendKind::Memory => Tiers::Memory(MemoryBackend::new(
                config.max_size_bytes,
                config.eviction_strategy,
                tracker.clone(),
            )?),
            BackendKind::Remote => Tiers::Remote(remote.ok_or_else(missing_remote)?),
            BackendKind::Hybrid => {
                let remote = remote.ok_or_else(missing_remote)?;
                Tiers::Hybrid {
                    memory: MemoryBackend::new(
                        config.max_size_bytes,
                        config.eviction_strategy,
                        tracker.clone(),
                    )?,
                    write_behind: WriteBehindQueue::spawn(
                        remote.clone(),
                        config.write_behind_depth,
                        config.write_behind_policy,
                        tracker.clone(),
                    )?,
                    remote,
                }
            }
        };

        info!(
            backend = ?config.backend,
            remote = tiers.remote_name(),
            strategy = %config.eviction_strategy,
            max_size_bytes = config.max_size_bytes,
            default_ttl = config.default_ttl_seconds,
            "cache store opened"
        );

        Ok(Self {
            tiers,
            default_ttl: config.default_ttl_seconds,
            repopulate_ttl: config.hybrid_repopulate_ttl_seconds,
            max_size_bytes: config.max_size_bytes,
            tracker,
        })
    }

    /// Memory-only store; handy for tests and embedding.
    pub fn in_memory(max_size_bytes: usize, strategy: EvictionStrategy, default_ttl: u64) -> Result<Self> {
        let config = Config {
            backend: BackendKind::Memory,
            eviction_strategy: strategy,
            max_size_bytes,
            default_ttl_seconds: default_ttl,
            ..Config::default()
        };
        Self::with_remote(&config, None)
    }

    // == Set ==
    /// Serializes `value` and stores it. `ttl` of `None` uses the default.
    ///
    /// Returns false if the value cannot be serialized or no tier accepted it.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<u64>) -> bool {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set_raw(key, bytes, ttl).await,
            Err(e) => {
                let err = CacheError::from(e);
                warn!(key, error = %err, "not caching value");
                false
            }
        }
    }

    /// Stores an already-serialized value.
    pub async fn set_raw(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> bool {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let size = value.len();

        let stored = match &self.tiers {
            Tiers::Memory(memory) => {
                memory.insert(key, value, ttl);
                true
            }
            Tiers::Remote(remote) => match remote.set(key, value, ttl).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(key, error = %e, "remote write failed");
                    false
                }
            },
            Tiers::Hybrid {
                memory,
                write_behind,
                ..
            } => {
                memory.insert(key, value.clone(), ttl);
                let op = WriteOp::Set {
                    key: key.to_string(),
                    value,
                    ttl_seconds: ttl,
                };
                if !write_behind.enqueue(op).await {
                    warn!(key, "write-behind queue closed, value remains memory-only");
                }
                true
            }
        };

        if stored {
            self.tracker.record_write(size);
        }
        stored
    }

    // == Get ==
    /// Fetches and deserializes a value.
    ///
    /// A stored value that no longer decodes as `T` is dropped and counted
    /// as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let decoded = match self.fetch(key).await {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key, error = %e, "cached value does not decode, dropping it");
                    self.delete(key).await;
                    None
                }
            },
            None => None,
        };
        self.record_lookup(decoded.is_some());
        decoded
    }

    /// Fetches the stored bytes. Counts exactly one hit or miss.
    pub async fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        let found = self.fetch(key).await;
        self.record_lookup(found.is_some());
        found
    }

    fn record_lookup(&self, hit: bool) {
        if hit {
            self.tracker.record_hit();
        } else {
            self.tracker.record_miss();
        }
    }

    async fn fetch(&self, key: &str) -> Option<Vec<u8>> {
        match &self.tiers {
            Tiers::Memory(memory) => memory_lookup(memory, key),
            Tiers::Remote(remote) => match remote.get(key).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(key, error = %e, "remote read failed, treating as miss");
                    None
                }
            },
            Tiers::Hybrid { memory, remote, .. } => match memory_lookup(memory, key) {
                Some(value) => Some(value),
                None => match remote.get_entry(key).await {
                    Ok(Some(found)) => {
                        let (ttl, created_at) = repopulate_lifetime(
                            self.repopulate_ttl,
                            found.expires_at,
                            current_timestamp_ms(),
                        );
                        debug!(key, ttl, "remote hit, repopulating memory");
                        memory.insert_with_created_at(key, found.value.clone(), ttl, created_at);
                        Some(found.value)
                    }
                    Ok(None) => None,
                    Err(e) => {
                        warn!(key, error = %e, "remote tier unavailable, degrading to memory-only read");
                        None
                    }
                },
            },
        }
    }

    // == Delete ==
    /// Removes a key from every tier. Returns whether any tier held it.
    pub async fn delete(&self, key: &str) -> bool {
        match &self.tiers {
            Tiers::Memory(memory) => memory.delete(key),
            Tiers::Remote(remote) => match remote.delete(key).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(key, error = %e, "remote delete failed");
                    false
                }
            },
            Tiers::Hybrid {
                memory,
                remote,
                write_behind,
            } => {
                let in_memory = memory.delete(key);
                // A queued write for this key must not land after the delete
                write_behind.flush().await;
                let in_remote = match remote.delete(key).await {
                    Ok(found) => found,
                    Err(e) => {
                        warn!(key, error = %e, "remote tier unavailable, delete applied to memory only");
                        false
                    }
                };
                in_memory || in_remote
            }
        }
    }

    // == Exists ==
    /// Checks for a live value without counting a hit or miss.
    pub async fn exists(&self, key: &str) -> bool {
        let remote = match &self.tiers {
            Tiers::Memory(memory) => return memory.exists(key),
            Tiers::Remote(remote) => remote,
            Tiers::Hybrid { memory, remote, .. } => {
                if memory.exists(key) {
                    return true;
                }
                remote
            }
        };
        match remote.exists(key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(key, error = %e, "remote tier unavailable, exists answered from memory");
                false
            }
        }
    }

    // == Clear ==
    /// Empties every tier. Hit/miss history is kept.
    ///
    /// Returns false if the external tier could not be cleared.
    pub async fn clear(&self) -> bool {
        let remote = match &self.tiers {
            Tiers::Memory(memory) => {
                memory.clear();
                return true;
            }
            Tiers::Remote(remote) => remote,
            Tiers::Hybrid {
                memory,
                remote,
                write_behind,
            } => {
                memory.clear();
                write_behind.flush().await;
                remote
            }
        };
        match remote.clear().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "could not clear remote tier");
                false
            }
        }
    }

    // == Cleanup Expired ==
    /// Sweeps expired entries from the memory tier.
    pub fn cleanup_expired(&self) -> usize {
        self.tiers.memory().map(|m| m.cleanup_expired()).unwrap_or(0)
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let (items, size) = self.tiers.memory().map(|m| m.usage()).unwrap_or((0, 0));
        self.tracker.cache_stats(items, size, self.max_size_bytes)
    }

    /// Shared tracker; the orchestrator records batch totals into it.
    pub fn tracker(&self) -> Arc<PerformanceStatsTracker> {
        self.tracker.clone()
    }

    /// Backend layout of this store.
    pub fn kind(&self) -> BackendKind {
        match self.tiers {
            Tiers::Memory(_) => BackendKind::Memory,
            Tiers::Remote(_) => BackendKind::Remote,
            Tiers::Hybrid { .. } => BackendKind::Hybrid,
        }
    }

    /// Default TTL applied when `set` gets `None`.
    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    /// Number of entries in the memory tier.
    pub fn len(&self) -> usize {
        self.tiers.memory().map(|m| m.len()).unwrap_or(0)
    }

    /// Returns true if the memory tier is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Memory-tier entry metadata without counting an access.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.tiers.memory().and_then(|m| m.peek(key))
    }

    /// Waits until pending write-behind operations are applied.
    pub async fn flush(&self) {
        if let Tiers::Hybrid { write_behind, .. } = &self.tiers {
            write_behind.flush().await;
        }
    }

    // == Close ==
    /// Drains the write-behind queue and stops its worker.
    pub async fn close(&self) {
        if let Tiers::Hybrid { write_behind, .. } = &self.tiers {
            write_behind.close().await;
        }
        info!("cache store closed");
    }
}

/// TTL and creation time for a value copied up from the external tier.
///
/// Uses the repopulate TTL unless the external copy expires sooner, in which
/// case the memory copy expires at exactly the same instant.
fn repopulate_lifetime(repopulate_ttl: u64, expires_at: Option<u64>, now: u64) -> (u64, u64) {
    let expires_at = match expires_at {
        Some(at) => at,
        None => return (repopulate_ttl, now),
    };
    let remaining_ms = expires_at.saturating_sub(now);
    if repopulate_ttl > 0 && repopulate_ttl.saturating_mul(1000) <= remaining_ms {
        return (repopulate_ttl, now);
    }
    let ttl = remaining_ms.div_ceil(1000).max(1);
    (ttl, expires_at.saturating_sub(ttl * 1000))
}

fn memory_lookup(memory: &MemoryBackend, key: &str) -> Option<Vec<u8>> {
    match memory.get(key) {
        Lookup::Hit(value) => Some(value),
        Lookup::Expired => {
            debug!(key, "entry expired");
            None
        }
        Lookup::Missing => None,
    }
}
