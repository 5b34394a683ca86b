//! Remote Backend Module
//!
//! Network-backed remote tier speaking the mini-redis REST protocol, and an
//! in-process fake with the same contract for tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::cache::backend::{CacheBackend, RemoteEntry};
use crate::cache::entry::current_timestamp_ms;
use crate::error::{CacheError, Result};

// == Wire Types ==
#[derive(Debug, Serialize)]
struct SetBody<'a> {
    key: &'a str,
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GetBody {
    value: String,
    /// Remaining lifetime in seconds, for servers that report it
    #[serde(default)]
    ttl: Option<u64>,
}

// == HTTP Remote Backend ==
/// Remote tier reached over HTTP.
///
/// Endpoints: `PUT /set`, `GET /get/:key`, `DELETE /del/:key`. Keys are sent
/// as a single percent-encoded path segment. Values travel as UTF-8 strings,
/// which holds for everything the store serializes. A TTL of zero is sent as
/// "no TTL", so the server applies its own default.
#[derive(Debug, Clone)]
pub struct HttpRemoteBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRemoteBackend {
    /// Creates a client for the cache server at `base_url`.
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref()).map_err(|e| {
            CacheError::Configuration(format!("invalid remote url '{}': {}", base_url.as_ref(), e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CacheError::Configuration(format!(
                "remote url '{}' cannot carry a path",
                base_url
            )));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// Builds `<base>/<segment>/...`, encoding each segment on its own.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                CacheError::Configuration(format!("remote url '{}' cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl CacheBackend for HttpRemoteBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn get_entry(&self, key: &str) -> Result<Option<RemoteEntry>> {
        let response = self.client.get(self.endpoint(&["get", key])?).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: GetBody = response.json().await?;
                let expires_at = body
                    .ttl
                    .filter(|ttl| *ttl > 0)
                    .map(|ttl| current_timestamp_ms().saturating_add(ttl.saturating_mul(1000)));
                Ok(Some(RemoteEntry {
                    value: body.value.into_bytes(),
                    expires_at,
                }))
            }
            status => Err(CacheError::Backend(format!("GET {} returned {}", key, status))),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()> {
        let value = String::from_utf8(value).map_err(|e| {
            CacheError::Serialization(format!("remote values must be UTF-8: {}", e))
        })?;
        let body = SetBody {
            key,
            value: &value,
            ttl: (ttl_seconds > 0).then_some(ttl_seconds),
        };
        let response = self.client.put(self.endpoint(&["set"])?).json(&body).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(CacheError::Backend(format!(
                "SET {} returned {}",
                key,
                response.status()
            )))
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let response = self.client.delete(self.endpoint(&["del", key])?).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(CacheError::Backend(format!("DELETE {} returned {}", key, status))),
        }
    }

    async fn clear(&self) -> Result<()> {
        Err(CacheError::Backend(
            "the remote protocol has no bulk clear".to_string(),
        ))
    }
}

// == In-Memory Remote ==
/// Fake remote tier backed by a map.
///
/// Can be switched to unreachable to exercise degradation paths.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    values: Mutex<HashMap<String, (Vec<u8>, u64, u64)>>,
    unreachable: AtomicBool,
    writes: AtomicU64,
}

impl InMemoryRemote {
    /// Creates an empty, reachable fake.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail (or succeed again).
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of successful writes received.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of values currently held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is held.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Vec<u8>, u64, u64)>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(CacheError::Backend("remote unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheBackend for InMemoryRemote {
    fn name(&self) -> &'static str {
        "in-memory-remote"
    }

    async fn get_entry(&self, key: &str) -> Result<Option<RemoteEntry>> {
        self.check_reachable()?;
        let now = current_timestamp_ms();
        let mut values = self.lock();
        let expires_at = match values.get(key) {
            None => return Ok(None),
            Some((_, ttl, created_at)) => (*ttl > 0).then(|| created_at + ttl * 1000),
        };
        if expires_at.is_some_and(|at| now > at) {
            values.remove(key);
            return Ok(None);
        }
        Ok(values.get(key).map(|(value, _, _)| RemoteEntry {
            value: value.clone(),
            expires_at,
        }))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()> {
        self.check_reachable()?;
        self.lock()
            .insert(key.to_string(), (value, ttl_seconds, current_timestamp_ms()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_reachable()?;
        Ok(self.lock().remove(key).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.check_reachable()?;
        self.lock().clear();
        Ok(())
    }
}
