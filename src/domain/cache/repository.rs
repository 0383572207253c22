//! Cache trait definition

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use super::value::{CacheValue, Number};
use crate::domain::CacheError;

/// Generic cache contract with TTL support.
///
/// Absence is an ordinary outcome reported through `Option`/`bool`. `Err` means
/// the backing storage could not be used for this call; it never poisons the
/// cache and the caller decides whether to retry.
///
/// Atomicity differs by backend: the Redis backend runs `pull`, `add` and the
/// counter operations as single server-side steps, the disk backend only
/// serializes them within one process.
#[async_trait]
pub trait Cache: Send + Sync + Debug {
    /// Stores a value that expires after `ttl`.
    ///
    /// Writes of NaN or infinite floats fail with `CacheError::Serialization`.
    async fn put(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<(), CacheError>;

    /// Stores a value with no expiry
    async fn put_forever(&self, key: &str, value: CacheValue) -> Result<(), CacheError>;

    /// Stores a value only when no live entry exists; returns whether it was stored
    async fn add(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<bool, CacheError>;

    /// Replaces the value of an existing entry, keeping its remaining TTL.
    ///
    /// Returns `false` without writing when the key is absent.
    async fn set(&self, key: &str, value: CacheValue) -> Result<bool, CacheError>;

    /// Gets a value
    async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError>;

    /// Gets a value and removes it in the same step
    async fn pull(&self, key: &str) -> Result<Option<CacheValue>, CacheError>;

    /// Checks if a live entry exists
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Deletes an entry; returns whether anything was removed
    async fn forget(&self, key: &str) -> Result<bool, CacheError>;

    /// Remaining lifetime, `None` for missing or expired entries
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    /// Adds `delta` to a numeric entry.
    ///
    /// Returns `false` when the key is absent or its value is not numeric.
    async fn increment_by(&self, key: &str, delta: Number) -> Result<bool, CacheError>;

    /// Subtracts `delta` from a numeric entry
    async fn decrement_by(&self, key: &str, delta: Number) -> Result<bool, CacheError>;

    async fn increment(&self, key: &str) -> Result<bool, CacheError> {
        self.increment_by(key, Number::Int(1)).await
    }

    async fn decrement(&self, key: &str) -> Result<bool, CacheError> {
        self.decrement_by(key, Number::Int(1)).await
    }

    async fn bool(&self, key: &str, fallback: bool) -> (bool, bool) {
        coerce(key, self.get(key).await, fallback, CacheValue::as_bool)
    }

    async fn int(&self, key: &str, fallback: isize) -> (isize, bool) {
        coerce(key, self.get(key).await, fallback, CacheValue::as_int::<isize>)
    }

    async fn int8(&self, key: &str, fallback: i8) -> (i8, bool) {
        coerce(key, self.get(key).await, fallback, CacheValue::as_int::<i8>)
    }

    async fn int16(&self, key: &str, fallback: i16) -> (i16, bool) {
        coerce(key, self.get(key).await, fallback, CacheValue::as_int::<i16>)
    }

    async fn int32(&self, key: &str, fallback: i32) -> (i32, bool) {
        coerce(key, self.get(key).await, fallback, CacheValue::as_int::<i32>)
    }

    async fn int64(&self, key: &str, fallback: i64) -> (i64, bool) {
        coerce(key, self.get(key).await, fallback, CacheValue::as_i64)
    }

    async fn uint(&self, key: &str, fallback: usize) -> (usize, bool) {
        coerce(key, self.get(key).await, fallback, CacheValue::as_uint::<usize>)
    }

    async fn uint8(&self, key: &str, fallback: u8) -> (u8, bool) {
        coerce(key, self.get(key).await, fallback, CacheValue::as_uint::<u8>)
    }

    async fn uint16(&self, key: &str, fallback: u16) -> (u16, bool) {
        coerce(key, self.get(key).await, fallback, CacheValue::as_uint::<u16>)
    }

    async fn uint32(&self, key: &str, fallback: u32) -> (u32, bool) {
        coerce(key, self.get(key).await, fallback, CacheValue::as_uint::<u32>)
    }

    async fn uint64(&self, key: &str, fallback: u64) -> (u64, bool) {
        coerce(key, self.get(key).await, fallback, CacheValue::as_u64)
    }

    async fn float32(&self, key: &str, fallback: f32) -> (f32, bool) {
        coerce(key, self.get(key).await, fallback, CacheValue::as_f32)
    }

    async fn float64(&self, key: &str, fallback: f64) -> (f64, bool) {
        coerce(key, self.get(key).await, fallback, CacheValue::as_f64)
    }

    async fn string(&self, key: &str, fallback: String) -> (String, bool) {
        coerce(key, self.get(key).await, fallback, |v| {
            v.as_str().map(str::to_string)
        })
    }

    async fn bytes(&self, key: &str, fallback: Vec<u8>) -> (Vec<u8>, bool) {
        coerce(key, self.get(key).await, fallback, |v| v.as_bytes().map(<[u8]>::to_vec))
    }
}

/// Applies a typed conversion to a lookup result, falling back on absence,
/// mismatch or storage failure.
pub(crate) fn coerce<T>(
    key: &str,
    result: Result<Option<CacheValue>, CacheError>,
    fallback: T,
    convert: impl FnOnce(&CacheValue) -> Option<T>,
) -> (T, bool) {
    match result {
        Ok(Some(value)) => match convert(&value) {
            Some(converted) => (converted, true),
            None => {
                tracing::debug!(key, stored = value.type_name(), "Cache value type mismatch");
                (fallback, false)
            }
        },
        Ok(None) => (fallback, false),
        Err(e) => {
            tracing::warn!(key, error = %e, "Cache read failed, using fallback");
            (fallback, false)
        }
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::domain::cache::CacheRecord;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory cache for testing code that only depends on the contract
    #[derive(Debug)]
    pub struct MockCache {
        entries: Mutex<HashMap<String, CacheRecord>>,
        error: Mutex<Option<String>>,
    }

    impl Default for MockCache {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockCache {
        pub fn new() -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
                error: Mutex::new(None),
            }
        }

        pub fn with_entry(self, key: &str, value: impl Into<CacheValue>, ttl: Duration) -> Self {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), CacheRecord::new(value.into(), ttl));
            self
        }

        pub fn with_error(self, error: impl Into<String>) -> Self {
            *self.error.lock().unwrap() = Some(error.into());
            self
        }

        pub fn fail_with(&self, error: impl Into<String>) {
            *self.error.lock().unwrap() = Some(error.into());
        }

        fn check_storable(value: &CacheValue) -> Result<(), CacheError> {
            if value.is_storable() {
                Ok(())
            } else {
                Err(CacheError::serialization("Cannot store non-finite float"))
            }
        }

        fn check_error(&self) -> Result<(), CacheError> {
            if let Some(error) = self.error.lock().unwrap().clone() {
                return Err(CacheError::remote(error));
            }
            Ok(())
        }

        fn live(&self, key: &str) -> Option<CacheRecord> {
            let mut entries = self.entries.lock().unwrap();
            let expired = entries.get(key)?.is_expired();
            if expired {
                entries.remove(key);
                return None;
            }
            entries.get(key).cloned()
        }

        fn apply(&self, key: &str, delta: Number) -> bool {
            let mut entries = self.entries.lock().unwrap();
            let Some(record) = entries.get_mut(key).filter(|r| !r.is_expired()) else {
                return false;
            };

            match record.value.checked_add(delta) {
                Some(value) => {
                    record.value = value;
                    true
                }
                None => false,
            }
        }
    }

    #[async_trait]
    impl Cache for MockCache {
        async fn put(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<(), CacheError> {
            self.check_error()?;
            Self::check_storable(&value)?;
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), CacheRecord::new(value, ttl));
            Ok(())
        }

        async fn put_forever(&self, key: &str, value: CacheValue) -> Result<(), CacheError> {
            self.check_error()?;
            Self::check_storable(&value)?;
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), CacheRecord::forever(value));
            Ok(())
        }

        async fn add(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<bool, CacheError> {
            self.check_error()?;
            if self.live(key).is_some() {
                return Ok(false);
            }
            self.put(key, value, ttl).await?;
            Ok(true)
        }

        async fn set(&self, key: &str, value: CacheValue) -> Result<bool, CacheError> {
            self.check_error()?;
            Self::check_storable(&value)?;
            let mut entries = self.entries.lock().unwrap();
            match entries.get_mut(key).filter(|r| !r.is_expired()) {
                Some(record) => {
                    record.value = value;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
            self.check_error()?;
            Ok(self.live(key).map(|r| r.value))
        }

        async fn pull(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
            self.check_error()?;
            let removed = self.entries.lock().unwrap().remove(key);
            Ok(removed.filter(|r| !r.is_expired()).map(|r| r.value))
        }

        async fn exists(&self, key: &str) -> Result<bool, CacheError> {
            self.check_error()?;
            Ok(self.live(key).is_some())
        }

        async fn forget(&self, key: &str) -> Result<bool, CacheError> {
            self.check_error()?;
            Ok(self.entries.lock().unwrap().remove(key).is_some())
        }

        async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
            self.check_error()?;
            Ok(self.live(key).and_then(|r| r.remaining()))
        }

        async fn increment_by(&self, key: &str, delta: Number) -> Result<bool, CacheError> {
            self.check_error()?;
            Ok(self.apply(key, delta))
        }

        async fn decrement_by(&self, key: &str, delta: Number) -> Result<bool, CacheError> {
            self.check_error()?;
            match delta.checked_neg() {
                Some(negated) => Ok(self.apply(key, negated)),
                None => Ok(false),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_cache_put_get() {
            let cache = MockCache::new();
            cache
                .put("key1", "value1".into(), Duration::from_secs(60))
                .await
                .unwrap();

            let result = cache.get("key1").await.unwrap();
            assert_eq!(result, Some(CacheValue::from("value1")));
        }

        #[tokio::test]
        async fn test_mock_cache_get_missing() {
            let cache = MockCache::new();
            assert!(cache.get("missing").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_mock_cache_with_error() {
            let cache = MockCache::new().with_error("Test error");

            let result = cache.get("key").await;
            assert!(result.is_err());
        }

        #[tokio::test]
        async fn test_mock_cache_increment() {
            let cache = MockCache::new().with_entry("counter", 5, Duration::from_secs(60));

            assert!(cache.increment_by("counter", Number::Int(3)).await.unwrap());
            assert!(cache.decrement("counter").await.unwrap());
            assert_eq!(cache.int64("counter", 0).await, (7, true));
        }

        #[tokio::test]
        async fn test_mock_cache_increment_missing() {
            let cache = MockCache::new();
            assert!(!cache.increment("counter").await.unwrap());
        }
    }
}
