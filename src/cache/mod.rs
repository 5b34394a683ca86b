//! Cache Module
//!
//! Byte-bounded caching with TTL expiry, pluggable eviction, and optional
//! remote or disk tiers.

mod backend;
mod disk;
mod entry;
mod memory;
mod policy;
mod remote;
mod stats;
mod store;
mod write_behind;


// Re-export public types
pub use backend::{CacheBackend, RemoteEntry};
pub use disk::DiskBackend;
pub use entry::{current_timestamp_ms, CacheEntry};
pub use memory::{Lookup, MemoryBackend};
pub use policy::{
    Eviction, EvictionPolicy, EvictionReason, EvictionStrategy, HybridPolicy, LfuPolicy, LruPolicy,
    TtlPolicy,
};
pub use remote::{HttpRemoteBackend, InMemoryRemote};
pub use stats::{
    hit_rate, memory_usage_percent, BatchRecord, CacheStats, PerformanceSnapshot,
    PerformanceStatsTracker,
};
pub use store::CacheStore;
pub use write_behind::{OverflowPolicy, WriteBehindQueue, WriteOp};
