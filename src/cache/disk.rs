//! Disk Backend Module
//!
//! Best-effort spillover tier: one gzip-compressed blob file per key. The
//! file's modification time stands in for the entry's creation time, so TTLs
//! survive a restart.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::cache::backend::{CacheBackend, RemoteEntry};
use crate::cache::entry::current_timestamp_ms;
use crate::error::{CacheError, Result};

const MAGIC: &[u8; 4] = b"ACB1";
const HEADER_LEN: usize = MAGIC.len() + 8;
const EXTENSION: &str = "blob.gz";

// == Disk Backend ==
/// Directory of compressed blob files.
#[derive(Debug, Clone)]
pub struct DiskBackend {
    dir: PathBuf,
}

impl DiskBackend {
    /// Opens (and creates if needed) the cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Root directory of the blob files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the blob for `key`.
    ///
    /// Keys are hashed so arbitrary key text maps to a safe file name.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.dir.join(format!("{:x}.{}", hasher.finalize(), EXTENSION))
    }

    async fn discard(&self, path: &Path, reason: &str) {
        warn!(path = %path.display(), reason, "discarding unreadable cache file");
        if let Err(e) = tokio::fs::remove_file(path).await {
            debug!(path = %path.display(), error = %e, "could not remove cache file");
        }
    }
}

#[async_trait]
impl CacheBackend for DiskBackend {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn get_entry(&self, key: &str) -> Result<Option<RemoteEntry>> {
        let path = self.path_for(key);
        let compressed = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                self.discard(&path, &e.to_string()).await;
                return Ok(None);
            }
        };

        let (ttl_seconds, value) = match decode_blob(&compressed) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.discard(&path, &e.to_string()).await;
                return Ok(None);
            }
        };

        if ttl_seconds == 0 {
            return Ok(Some(RemoteEntry {
                value,
                expires_at: None,
            }));
        }

        let created_at = match modified_ms(&path).await {
            Some(ms) => ms,
            None => {
                self.discard(&path, "missing modification time").await;
                return Ok(None);
            }
        };
        let expires_at = created_at.saturating_add(ttl_seconds.saturating_mul(1000));
        if current_timestamp_ms() > expires_at {
            debug!(key, "disk entry expired");
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }

        Ok(Some(RemoteEntry {
            value,
            expires_at: Some(expires_at),
        }))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()> {
        let path = self.path_for(key);
        let blob = encode_blob(ttl_seconds, &value)?;

        // Write-then-rename so readers never see a half-written file
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &blob).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let is_blob = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(EXTENSION))
                .unwrap_or(false);
            if is_blob {
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }
}

// == Blob Encoding ==
fn encode_blob(ttl_seconds: u64, value: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(HEADER_LEN + value.len() / 2), Compression::default());
    encoder.write_all(MAGIC)?;
    encoder.write_all(&ttl_seconds.to_le_bytes())?;
    encoder.write_all(value)?;
    Ok(encoder.finish()?)
}

fn decode_blob(compressed: &[u8]) -> Result<(u64, Vec<u8>)> {
    let mut decoder = GzDecoder::new(compressed);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw)?;

    if raw.len() < HEADER_LEN || &raw[..MAGIC.len()] != MAGIC {
        return Err(CacheError::Serialization("bad blob header".to_string()));
    }
    let mut ttl = [0u8; 8];
    ttl.copy_from_slice(&raw[MAGIC.len()..HEADER_LEN]);
    Ok((u64::from_le_bytes(ttl), raw.split_off(HEADER_LEN)))
}

async fn modified_ms(path: &Path) -> Option<u64> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    modified
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_millis() as u64)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_disk_round_trip() {
        let tmp = TempDir::new().unwrap();
        let disk = DiskBackend::open(tmp.path()).unwrap();

        disk.set("chart:abc", b"{\"x\":1}".to_vec(), 0).await.unwrap();

        assert_eq!(disk.get("chart:abc").await.unwrap(), Some(b"{\"x\":1}".to_vec()));
        assert!(disk.path_for("chart:abc").exists());
    }

    #[tokio::test]
    async fn test_disk_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let disk = DiskBackend::open(tmp.path()).unwrap();
            disk.set("k", b"persisted".to_vec(), 100).await.unwrap();
        }

        let reopened = DiskBackend::open(tmp.path()).unwrap();
        assert_eq!(reopened.get("k").await.unwrap(), Some(b"persisted".to_vec()));
    }

    #[tokio::test]
    async fn test_entry_reports_expiry() {
        let tmp = TempDir::new().unwrap();
        let disk = DiskBackend::open(tmp.path()).unwrap();
        disk.set("forever", b"1".to_vec(), 0).await.unwrap();
        disk.set("short", b"2".to_vec(), 30).await.unwrap();

        let forever = disk.get_entry("forever").await.unwrap().unwrap();
        assert_eq!(forever.expires_at, None);

        let now = current_timestamp_ms();
        let expires_at = disk.get_entry("short").await.unwrap().unwrap().expires_at.unwrap();
        // mtime granularity may put the write slightly before `now`
        assert!(expires_at > now + 28_000 && expires_at <= now + 30_000);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_miss_and_removed() {
        let tmp = TempDir::new().unwrap();
        let disk = DiskBackend::open(tmp.path()).unwrap();
        let path = disk.path_for("k");
        std::fs::write(&path, b"definitely not gzip").unwrap();

        assert_eq!(disk.get("k").await.unwrap(), None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_expired_by_mtime() {
        let tmp = TempDir::new().unwrap();
        let disk = DiskBackend::open(tmp.path()).unwrap();
        disk.set("k", b"v".to_vec(), 1).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(disk.get("k").await.unwrap(), None);
        assert!(!disk.path_for("k").exists());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let tmp = TempDir::new().unwrap();
        let disk = DiskBackend::open(tmp.path()).unwrap();
        disk.set("a", b"1".to_vec(), 0).await.unwrap();
        disk.set("b", b"2".to_vec(), 0).await.unwrap();

        assert!(disk.delete("a").await.unwrap());
        assert!(!disk.delete("a").await.unwrap());

        disk.clear().await.unwrap();
        assert_eq!(disk.get("b").await.unwrap(), None);
    }
}
