//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and access
//! metadata.

use std::time::{SystemTime, UNIX_EPOCH};

// == Cache Entry ==
/// A single stored blob with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Key the entry is stored under
    pub key: String,
    /// Serialized value
    pub value: Vec<u8>,
    /// TTL in seconds, 0 = no expiration
    pub ttl_seconds: u64,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Last read or write (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Number of reads since insertion
    pub access_count: u64,
    /// Size of `value` at insert time
    pub size_bytes: usize,
    /// Store-wide logical clock value of the last access.
    ///
    /// Orders accesses that land in the same millisecond.
    pub access_tick: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry stamped with the current time.
    pub fn new(key: impl Into<String>, value: Vec<u8>, ttl_seconds: u64, tick: u64) -> Self {
        Self::with_created_at(key, value, ttl_seconds, current_timestamp_ms(), tick)
    }

    /// Creates an entry with an explicit creation time.
    ///
    /// Used when the age of a value is known from elsewhere, e.g. a file mtime.
    pub fn with_created_at(
        key: impl Into<String>,
        value: Vec<u8>,
        ttl_seconds: u64,
        created_at: u64,
        tick: u64,
    ) -> Self {
        let size_bytes = value.len();
        Self {
            key: key.into(),
            value,
            ttl_seconds,
            created_at,
            last_accessed_at: created_at,
            access_count: 0,
            size_bytes,
            access_tick: tick,
        }
    }

    /// Expiration timestamp (Unix milliseconds), None = no expiration.
    pub fn expires_at(&self) -> Option<u64> {
        match self.ttl_seconds {
            0 => None,
            ttl => Some(self.created_at.saturating_add(ttl.saturating_mul(1000))),
        }
    }

    // == Is Expired ==
    /// Checks whether the entry has outlived its TTL at `now`.
    ///
    /// An entry is still valid at exactly `created_at + ttl` and expired
    /// strictly after it.
    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at() {
            Some(expires) => now > expires,
            None => false,
        }
    }

    /// Checks expiry against the wall clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    // == Touch ==
    /// Records a read.
    pub fn touch(&mut self, now: u64, tick: u64) {
        self.last_accessed_at = now;
        self.access_count += 1;
        self.access_tick = tick;
    }

    /// Returns remaining TTL in seconds, or None if no expiration is set.
    pub fn ttl_remaining(&self) -> Option<u64> {
        self.expires_at().map(|expires| {
            let now = current_timestamp_ms();
            expires.saturating_sub(now) / 1000
        })
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new("k", b"test_value".to_vec(), 0, 1);

        assert_eq!(entry.value, b"test_value");
        assert_eq!(entry.size_bytes, 10);
        assert!(entry.expires_at().is_none());
        assert!(!entry.is_expired());
        assert_eq!(entry.access_count, 0);
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = CacheEntry::new("k", b"v".to_vec(), 60, 1);

        assert_eq!(entry.expires_at(), Some(entry.created_at + 60_000));
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new("k", b"v".to_vec(), 1, 1);

        assert!(!entry.is_expired());

        sleep(Duration::from_millis(1100));

        assert!(entry.is_expired());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry::with_created_at("k", b"v".to_vec(), 1, 10_000, 1);

        assert!(!entry.is_expired_at(11_000), "still valid at exactly created_at + ttl");
        assert!(entry.is_expired_at(11_001), "expired strictly after created_at + ttl");
    }

    #[test]
    fn test_touch_updates_access_metadata() {
        let mut entry = CacheEntry::with_created_at("k", b"v".to_vec(), 0, 1_000, 1);

        entry.touch(2_000, 7);
        entry.touch(3_000, 9);

        assert_eq!(entry.access_count, 2);
        assert_eq!(entry.last_accessed_at, 3_000);
        assert_eq!(entry.access_tick, 9);
        assert_eq!(entry.value, b"v");
    }

    #[test]
    fn test_ttl_remaining_seconds() {
        let entry = CacheEntry::new("k", b"v".to_vec(), 10, 1);

        let remaining = entry.ttl_remaining().unwrap();
        assert!(remaining <= 10);
        assert!(remaining >= 9);
    }

    #[test]
    fn test_ttl_remaining_no_expiration() {
        let entry = CacheEntry::new("k", b"v".to_vec(), 0, 1);
        assert!(entry.ttl_remaining().is_none());
    }
}
