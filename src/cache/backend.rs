//! Backend Trait Module
//!
//! Capability interface for cache tiers that live outside this process.

use async_trait::async_trait;

use crate::error::Result;

/// A live value read from an external tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub value: Vec<u8>,
    /// Absolute expiry in Unix milliseconds. `None` when the value never
    /// expires or the tier does not report it.
    pub expires_at: Option<u64>,
}

/// An external key/blob store used as the remote or spillover tier.
///
/// Every failure is reported as [`crate::error::CacheError::Backend`] (or
/// `Io` for local files); the store decides how to degrade.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Fetches a live value with its expiry, `None` if absent or expired.
    async fn get_entry(&self, key: &str) -> Result<Option<RemoteEntry>>;

    /// Fetches a live value, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get_entry(key).await?.map(|entry| entry.value))
    }

    /// Stores a value. `ttl_seconds == 0` means no expiry where the backend
    /// supports it.
    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()>;

    /// Removes a value. Returns whether it was present.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Checks for a live value.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Removes every value.
    async fn clear(&self) -> Result<()>;
}
