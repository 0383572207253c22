//! Disk cache implementation
//!
//! One file per entry, named by the SHA-256 of the namespaced key. Expiry is
//! enforced lazily: an expired file is removed the next time it is read.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::domain::cache::{Cache, CacheRecord, CacheValue, KeyPrefix, Number};
use crate::domain::CacheError;

/// Number of lock stripes guarding writes and deletes
const LOCK_STRIPES: usize = 64;

/// State of an entry's file as found on disk
enum Slot {
    Missing,
    Live(CacheRecord),
    /// Expired or unreadable; removed only under the stripe lock
    Stale,
}

/// Configuration for disk cache
#[derive(Debug, Clone)]
pub struct DiskCacheConfig {
    /// Directory holding cache files, created on first write
    pub dir: PathBuf,
    /// Key prefix for namespacing
    pub prefix: String,
}

impl DiskCacheConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: String::new(),
        }
    }

    /// Sets the key prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

/// File-backed cache.
///
/// Every write and delete, including the read-modify-write sequences of `set`,
/// `add`, `pull` and the counters, runs under a striped in-process lock shared
/// between clones of the same instance. Reads take no lock unless they find a
/// stale file to purge. Separately constructed instances, or other
/// processes, pointed at the same directory are not coordinated: concurrent
/// mutations of one key from those are last-write-wins.
#[derive(Debug, Clone)]
pub struct DiskCache {
    prefix: KeyPrefix,
    dir: PathBuf,
    locks: Arc<[Mutex<()>]>,
}

impl DiskCache {
    pub fn new(prefix: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self::with_config(DiskCacheConfig::new(dir).with_prefix(prefix))
    }

    pub fn with_config(config: DiskCacheConfig) -> Self {
        let locks: Vec<Mutex<()>> = (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect();

        Self {
            prefix: KeyPrefix::new(config.prefix),
            dir: config.dir,
            locks: locks.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prefix(&self) -> &str {
        self.prefix.as_str()
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(self.prefix.digest(key))
    }

    async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        let digest = self.prefix.digest(key);
        let stripe = u8::from_str_radix(&digest[..2], 16).unwrap_or(0) as usize % LOCK_STRIPES;
        self.locks[stripe].lock().await
    }

    /// Reads the file without touching it; stale files are reported, not removed
    async fn load(&self, key: &str) -> Result<Slot, CacheError> {
        let path = self.path_for(key);

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Slot::Missing),
            Err(e) => {
                return Err(CacheError::io(format!(
                    "Failed to read cache file for key '{}': {}",
                    key, e
                )))
            }
        };

        match CacheRecord::decode(&data) {
            Ok(record) if record.is_expired() => {
                debug!(key, "Cache entry expired");
                Ok(Slot::Stale)
            }
            Ok(record) => Ok(Slot::Live(record)),
            Err(e) => {
                warn!(key, path = %path.display(), error = %e, "Discarding unreadable cache file");
                Ok(Slot::Stale)
            }
        }
    }

    /// Live record for `key`. The caller must hold the key's stripe lock.
    async fn read_locked(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        match self.load(key).await? {
            Slot::Live(record) => Ok(Some(record)),
            Slot::Missing => Ok(None),
            Slot::Stale => {
                self.delete(key).await?;
                Ok(None)
            }
        }
    }

    /// Live record for `key`; takes the stripe lock only to purge a stale file
    async fn read(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        match self.load(key).await? {
            Slot::Live(record) => Ok(Some(record)),
            Slot::Missing => Ok(None),
            Slot::Stale => {
                let _guard = self.lock(key).await;
                // A write may have replaced the stale file in the meantime
                self.read_locked(key).await
            }
        }
    }

    async fn write(&self, key: &str, record: &CacheRecord) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            CacheError::io(format!(
                "Failed to create cache directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let data = record.encode()?;
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));

        if let Err(e) = fs::write(&tmp, &data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheError::io(format!(
                "Failed to write cache file for key '{}': {}",
                key, e
            )));
        }

        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheError::io(format!(
                "Failed to replace cache file for key '{}': {}",
                key, e
            )));
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(format!(
                "Failed to delete cache file for key '{}': {}",
                key, e
            ))),
        }
    }

    async fn apply(&self, key: &str, delta: Number) -> Result<bool, CacheError> {
        let _guard = self.lock(key).await;

        let Some(mut record) = self.read_locked(key).await? else {
            debug!(key, "Counter update on missing key");
            return Ok(false);
        };

        match record.value.checked_add(delta) {
            Some(value) => {
                record.value = value;
                self.write(key, &record).await?;
                Ok(true)
            }
            None => {
                debug!(key, stored = record.value.type_name(), "Counter update on non-numeric value");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl Cache for DiskCache {
    async fn put(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<(), CacheError> {
        let _guard = self.lock(key).await;
        self.write(key, &CacheRecord::new(value, ttl)).await
    }

    async fn put_forever(&self, key: &str, value: CacheValue) -> Result<(), CacheError> {
        let _guard = self.lock(key).await;
        self.write(key, &CacheRecord::forever(value)).await
    }

    async fn add(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<bool, CacheError> {
        let _guard = self.lock(key).await;

        if self.read_locked(key).await?.is_some() {
            return Ok(false);
        }

        self.write(key, &CacheRecord::new(value, ttl)).await?;
        Ok(true)
    }

    async fn set(&self, key: &str, value: CacheValue) -> Result<bool, CacheError> {
        let _guard = self.lock(key).await;

        match self.read_locked(key).await? {
            Some(mut record) => {
                record.value = value;
                self.write(key, &record).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
        Ok(self.read(key).await?.map(|record| record.value))
    }

    async fn pull(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
        let _guard = self.lock(key).await;

        match self.read_locked(key).await? {
            Some(record) => {
                self.delete(key).await?;
                Ok(Some(record.value))
            }
            None => Ok(None),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.read(key).await?.is_some())
    }

    async fn forget(&self, key: &str) -> Result<bool, CacheError> {
        let _guard = self.lock(key).await;
        self.delete(key).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        Ok(self.read(key).await?.and_then(|record| record.remaining()))
    }

    async fn increment_by(&self, key: &str, delta: Number) -> Result<bool, CacheError> {
        self.apply(key, delta).await
    }

    async fn decrement_by(&self, key: &str, delta: Number) -> Result<bool, CacheError> {
        match delta.checked_neg() {
            Some(negated) => self.apply(key, negated).await,
            None => Ok(false),
        }
    }
}
