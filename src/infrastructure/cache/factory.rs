//! Cache factory for runtime selection

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::cache::Cache;
use crate::domain::CacheError;

use super::disk::{DiskCache, DiskCacheConfig};
use super::redis::{RedisCache, RedisCacheConfig};

/// Supported cache backends
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    /// One file per entry under a local directory
    #[default]
    Disk,
    /// Redis server
    Redis,
}

impl std::fmt::Display for CacheType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheType::Disk => write!(f, "disk"),
            CacheType::Redis => write!(f, "redis"),
        }
    }
}

impl std::str::FromStr for CacheType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disk" | "file" => Ok(CacheType::Disk),
            "redis" => Ok(CacheType::Redis),
            _ => Err(CacheError::configuration(format!(
                "Unknown cache type: {}. Valid types: disk, redis",
                s
            ))),
        }
    }
}

/// Configuration for cache factory
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Type of cache to create
    pub backend: CacheType,
    /// Key prefix for namespacing
    pub prefix: String,
    /// Storage directory (disk backend)
    pub disk_dir: PathBuf,
    /// Redis address (redis backend)
    pub redis_host: String,
    /// Redis logical database
    pub redis_db: u8,
    /// Idle Redis connections kept
    pub max_idle: usize,
    /// Redis connections in use at once, 0 for no limit
    pub max_active: usize,
    /// Redis connection timeout in seconds
    pub connection_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheType::Disk,
            prefix: String::new(),
            disk_dir: PathBuf::from("storage/cache"),
            redis_host: "127.0.0.1:6379".to_string(),
            redis_db: 0,
            max_idle: 10,
            max_active: 0,
            connection_timeout_secs: 5,
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration for a disk cache
    pub fn disk(dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: CacheType::Disk,
            disk_dir: dir.into(),
            ..Default::default()
        }
    }

    /// Creates a new configuration for a Redis cache
    pub fn redis(host: impl Into<String>) -> Self {
        Self {
            backend: CacheType::Redis,
            redis_host: host.into(),
            ..Default::default()
        }
    }

    /// Sets the key prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the Redis database index
    pub fn with_db(mut self, db: u8) -> Self {
        self.redis_db = db;
        self
    }

    /// Sets Redis pool sizing
    pub fn with_pool_size(mut self, max_idle: usize, max_active: usize) -> Self {
        self.max_idle = max_idle;
        self.max_active = max_active;
        self
    }
}

/// Factory for creating cache instances
#[derive(Debug, Default)]
pub struct CacheFactory;

impl CacheFactory {
    /// Creates a new cache factory
    pub fn new() -> Self {
        Self
    }

    /// Creates a cache instance based on configuration
    pub fn create(&self, config: &CacheConfig) -> Result<Arc<dyn Cache>, CacheError> {
        match config.backend {
            CacheType::Disk => {
                if config.disk_dir.as_os_str().is_empty() {
                    return Err(CacheError::configuration(
                        "A storage directory is required for the disk cache",
                    ));
                }

                let disk_config =
                    DiskCacheConfig::new(config.disk_dir.clone()).with_prefix(config.prefix.clone());

                tracing::info!(dir = %config.disk_dir.display(), prefix = %config.prefix, "Disk cache configured");
                Ok(Arc::new(DiskCache::with_config(disk_config)))
            }
            CacheType::Redis => {
                if config.redis_host.is_empty() {
                    return Err(CacheError::configuration(
                        "A Redis host is required for the redis cache",
                    ));
                }

                let redis_config = RedisCacheConfig::new(config.redis_host.clone())
                    .with_prefix(config.prefix.clone())
                    .with_db(config.redis_db)
                    .with_pool_size(config.max_idle, config.max_active)
                    .with_connection_timeout(Duration::from_secs(config.connection_timeout_secs));

                Ok(Arc::new(RedisCache::new(redis_config)?))
            }
        }
    }
}
