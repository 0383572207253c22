//! Attempt-counting rate limiter
//!
//! Keeps the remaining attempts for one key in a single cache entry whose TTL
//! is the lockout window.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::domain::cache::{Cache, CacheValue};
use crate::domain::CacheError;

/// Rate limiter backed by any [`Cache`]
#[derive(Debug, Clone)]
pub struct RateLimiter {
    key: String,
    max_attempts: u32,
    cache: Arc<dyn Cache>,
}

impl RateLimiter {
    /// Opens the limiter for `key`, seeding `max_attempts` for `ttl` unless an
    /// entry is already running. Re-opening never resets a limiter.
    pub async fn new(
        key: impl Into<String>,
        max_attempts: u32,
        ttl: Duration,
        cache: Arc<dyn Cache>,
    ) -> Result<Self, CacheError> {
        let key = key.into();

        if cache.add(&key, CacheValue::from(max_attempts), ttl).await? {
            debug!(key = %key, max_attempts, "Rate limiter window started");
        }

        Ok(Self {
            key,
            max_attempts,
            cache,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Remaining attempts, `None` when no window is running.
    /// A non-numeric entry counts as exhausted.
    async fn counter(&self) -> Result<Option<i64>, CacheError> {
        Ok(self
            .cache
            .get(&self.key)
            .await?
            .map(|value| value.as_i64().unwrap_or(0)))
    }

    /// Records one attempt.
    ///
    /// The check and the decrement are separate cache calls, so concurrent hits
    /// can overshoot below zero; the hit that sees a negative count puts it back
    /// to zero, keeping the window.
    pub async fn hit(&self) -> Result<(), CacheError> {
        let Some(remaining) = self.counter().await? else {
            return Ok(());
        };
        if remaining <= 0 || !self.cache.decrement(&self.key).await? {
            return Ok(());
        }

        if matches!(self.counter().await?, Some(after) if after < 0) {
            debug!(key = %self.key, "Rate limiter counter overshot, clamping to zero");
            self.cache.set(&self.key, CacheValue::Int(0)).await?;
        }
        Ok(())
    }

    /// Uses up every remaining attempt without touching the window
    pub async fn lock(&self) -> Result<(), CacheError> {
        if self.cache.set(&self.key, CacheValue::Int(0)).await? {
            debug!(key = %self.key, "Rate limiter locked");
        }
        Ok(())
    }

    /// Drops the window entirely
    pub async fn reset(&self) -> Result<(), CacheError> {
        self.cache.forget(&self.key).await?;
        Ok(())
    }

    pub async fn must_lock(&self) -> Result<bool, CacheError> {
        Ok(matches!(self.counter().await?, Some(remaining) if remaining <= 0))
    }

    pub async fn total_attempts(&self) -> Result<u32, CacheError> {
        Ok(match self.counter().await? {
            Some(remaining) => {
                let remaining = remaining.clamp(0, i64::from(self.max_attempts)) as u32;
                self.max_attempts - remaining
            }
            None => 0,
        })
    }

    pub async fn retries_left(&self) -> Result<u32, CacheError> {
        let used = self.total_attempts().await?;
        Ok(self.max_attempts.saturating_sub(used))
    }

    /// Time until the window closes, zero when none is running
    pub async fn available_in(&self) -> Result<Duration, CacheError> {
        Ok(self.cache.ttl(&self.key).await?.unwrap_or_default())
    }
}
