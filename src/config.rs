//! Configuration Module
//!
//! Handles loading and validating cache and orchestrator configuration from
//! environment variables.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{EvictionStrategy, OverflowPolicy};
use crate::error::{CacheError, Result};

// == Backend Kind ==
/// Which tiers the cache store is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// In-process map with eviction
    Memory,
    /// External store only (HTTP or disk)
    Remote,
    /// Memory in front of an external store
    Hybrid,
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "remote" => Ok(BackendKind::Remote),
            "hybrid" => Ok(BackendKind::Hybrid),
            other => Err(CacheError::Configuration(format!(
                "unknown cache backend '{}' (expected memory, remote or hybrid)",
                other
            ))),
        }
    }
}

/// Where the non-memory tier lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTarget {
    /// A mini-redis style REST cache at the given base URL
    Http(String),
    /// Compressed blob files under the given directory
    Disk(PathBuf),
}

/// Cache and orchestrator configuration.
///
/// `Default` and `from_env` give every field an explicit value; call
/// [`Config::validate`] before building anything from it.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend layout
    pub backend: BackendKind,
    /// Eviction strategy for the memory tier
    pub eviction_strategy: EvictionStrategy,
    /// Capacity of the memory tier in bytes
    pub max_size_bytes: usize,
    /// Default TTL in seconds, 0 = no expiry
    pub default_ttl_seconds: u64,
    /// Worker pool size for parallel generation
    pub max_workers: usize,
    /// Dispatch misses to the worker pool when more than one
    pub parallel_enabled: bool,
    /// Per-item generation time above which a warning is logged
    pub target_item_time_seconds: f64,
    /// Optional deadline applied to every batch
    pub batch_timeout_ms: Option<u64>,
    /// External tier for remote/hybrid backends
    pub remote: Option<RemoteTarget>,
    /// TTL used when a remote hit repopulates memory
    pub hybrid_repopulate_ttl_seconds: u64,
    /// Maximum pending write-behind operations
    pub write_behind_depth: usize,
    /// What to do when the write-behind queue is full
    pub write_behind_policy: OverflowPolicy,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BACKEND` - memory | remote | hybrid (default: memory)
    /// - `EVICTION_STRATEGY` - lru | lfu | ttl | hybrid (default: lru)
    /// - `MAX_SIZE_BYTES` - memory capacity (default: 100 MiB)
    /// - `DEFAULT_TTL` - TTL in seconds (default: 3600)
    /// - `MAX_WORKERS` - worker pool size (default: 4)
    /// - `PARALLEL_ENABLED` - true | false (default: true)
    /// - `TARGET_ITEM_TIME` - seconds per item (default: 2.0)
    /// - `BATCH_TIMEOUT_MS` - batch deadline (default: none)
    /// - `REMOTE_URL` / `DISK_CACHE_DIR` - external tier (URL wins if both set)
    /// - `HYBRID_REPOPULATE_TTL` - seconds (default: 60)
    /// - `WRITE_BEHIND_DEPTH` - queue depth (default: 256)
    /// - `WRITE_BEHIND_POLICY` - block | drop_oldest (default: block)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - cleanup frequency in seconds (default: 30)
    ///
    /// Unset or empty variables take the default. A variable that is set but
    /// does not parse is a configuration error naming the variable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let remote = match (var("REMOTE_URL"), var("DISK_CACHE_DIR")) {
            (Some(url), _) => Some(RemoteTarget::Http(url.trim().to_string())),
            (None, Some(dir)) => Some(RemoteTarget::Disk(PathBuf::from(dir))),
            (None, None) => None,
        };

        Ok(Self {
            backend: match var("CACHE_BACKEND") {
                Some(v) => v.parse()?,
                None => defaults.backend,
            },
            eviction_strategy: match var("EVICTION_STRATEGY") {
                Some(v) => v.parse()?,
                None => defaults.eviction_strategy,
            },
            max_size_bytes: parse_var(&var, "MAX_SIZE_BYTES")?.unwrap_or(defaults.max_size_bytes),
            default_ttl_seconds: parse_var(&var, "DEFAULT_TTL")?.unwrap_or(defaults.default_ttl_seconds),
            max_workers: parse_var(&var, "MAX_WORKERS")?.unwrap_or(defaults.max_workers),
            parallel_enabled: parse_flag(&var, "PARALLEL_ENABLED")?.unwrap_or(defaults.parallel_enabled),
            target_item_time_seconds: parse_var(&var, "TARGET_ITEM_TIME")?
                .unwrap_or(defaults.target_item_time_seconds),
            batch_timeout_ms: parse_var(&var, "BATCH_TIMEOUT_MS")?,
            remote,
            hybrid_repopulate_ttl_seconds: parse_var(&var, "HYBRID_REPOPULATE_TTL")?
                .unwrap_or(defaults.hybrid_repopulate_ttl_seconds),
            write_behind_depth: parse_var(&var, "WRITE_BEHIND_DEPTH")?
                .unwrap_or(defaults.write_behind_depth),
            write_behind_policy: match var("WRITE_BEHIND_POLICY") {
                Some(v) => v.parse()?,
                None => defaults.write_behind_policy,
            },
            server_port: parse_var(&var, "SERVER_PORT")?.unwrap_or(defaults.server_port),
            cleanup_interval: parse_var(&var, "CLEANUP_INTERVAL")?.unwrap_or(defaults.cleanup_interval),
        })
    }

    // == Validate ==
    /// Fails fast on values that would make the store or pool unusable.
    pub fn validate(&self) -> Result<()> {
        if self.max_size_bytes == 0 {
            return Err(CacheError::Configuration(
                "max_size_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(CacheError::Configuration(
                "max_workers must be greater than zero".to_string(),
            ));
        }
        if self.write_behind_depth == 0 {
            return Err(CacheError::Configuration(
                "write_behind_depth must be greater than zero".to_string(),
            ));
        }
        if !self.target_item_time_seconds.is_finite() || self.target_item_time_seconds < 0.0 {
            return Err(CacheError::Configuration(
                "target_item_time_seconds must be a non-negative number".to_string(),
            ));
        }
        if self.backend != BackendKind::Memory && self.remote.is_none() {
            return Err(CacheError::Configuration(format!(
                "{:?} backend requires REMOTE_URL or DISK_CACHE_DIR",
                self.backend
            )));
        }
        Ok(())
    }

    /// Batch deadline as a Duration, if configured.
    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            eviction_strategy: EvictionStrategy::Lru,
            max_size_bytes: 100 * 1024 * 1024,
            default_ttl_seconds: 3600,
            max_workers: 4,
            parallel_enabled: true,
            target_item_time_seconds: 2.0,
            batch_timeout_ms: None,
            remote: None,
            hybrid_repopulate_ttl_seconds: 60,
            write_behind_depth: 256,
            write_behind_policy: OverflowPolicy::Block,
            server_port: 3000,
            cleanup_interval: 30,
        }
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match var(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e| {
            CacheError::Configuration(format!("{} has invalid value '{}': {}", name, raw.trim(), e))
        }),
    }
}

fn parse_flag(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<bool>> {
    match var(name).map(|raw| raw.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(raw) => match raw.as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(CacheError::Configuration(format!(
                "{} has invalid value '{}': expected true or false",
                name, raw
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.eviction_strategy, EvictionStrategy::Lru);
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.server_port, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = Config {
            max_size_bytes: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::Configuration(_))));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = Config {
            max_workers: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::Configuration(_))));
    }

    #[test]
    fn test_hybrid_without_remote_rejected() {
        let config = Config {
            backend: BackendKind::Hybrid,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::Configuration(_))));

        let config = Config {
            backend: BackendKind::Hybrid,
            remote: Some(RemoteTarget::Http("http://localhost:3000".to_string())),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_lookup_overrides_and_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("CACHE_BACKEND", "hybrid"),
            ("MAX_WORKERS", " 8 "),
            ("PARALLEL_ENABLED", "off"),
            ("BATCH_TIMEOUT_MS", "1500"),
            ("DISK_CACHE_DIR", "/tmp/artifacts"),
            ("DEFAULT_TTL", ""),
        ]))
        .unwrap();

        assert_eq!(config.backend, BackendKind::Hybrid);
        assert_eq!(config.max_workers, 8);
        assert!(!config.parallel_enabled);
        assert_eq!(config.batch_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.remote, Some(RemoteTarget::Disk(PathBuf::from("/tmp/artifacts"))));
        assert_eq!(config.default_ttl_seconds, Config::default().default_ttl_seconds);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparseable_values_are_rejected() {
        for (name, value) in [
            ("MAX_WORKERS", "-3"),
            ("MAX_SIZE_BYTES", "abc"),
            ("BATCH_TIMEOUT_MS", "soon"),
            ("TARGET_ITEM_TIME", "fast"),
            ("PARALLEL_ENABLED", "maybe"),
            ("SERVER_PORT", "70000"),
        ] {
            match Config::from_lookup(lookup(&[(name, value)])) {
                Err(CacheError::Configuration(message)) => assert!(message.contains(name), "{}", message),
                other => panic!("{}={} should be rejected, got {:?}", name, value, other),
            }
        }
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("Hybrid".parse::<BackendKind>().unwrap(), BackendKind::Hybrid);
        assert!(matches!(
            "redis".parse::<BackendKind>(),
            Err(CacheError::Configuration(_))
        ));
    }
}
