//! Short-lived verification codes
//!
//! One cache entry per code key. Every new code replaces the previous one and
//! starts a fresh validity window.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::generator::{CodeGenerator, RandomCodeGenerator};
use crate::domain::cache::{Cache, CacheValue};
use crate::domain::CacheError;

/// Length used by [`VerificationCode::generate`]
pub const DEFAULT_CODE_LENGTH: usize = 5;

/// Verification code stored under one key for a fixed validity window
#[derive(Clone)]
pub struct VerificationCode {
    key: String,
    ttl: Duration,
    cache: Arc<dyn Cache>,
    generator: Arc<dyn CodeGenerator>,
}

impl fmt::Debug for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationCode")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl VerificationCode {
    /// Numeric codes drawn from the operating system's random source
    pub fn new(key: impl Into<String>, ttl: Duration, cache: Arc<dyn Cache>) -> Self {
        Self::with_generator(key, ttl, cache, Arc::new(RandomCodeGenerator::numeric()))
    }

    pub fn with_generator(
        key: impl Into<String>,
        ttl: Duration,
        cache: Arc<dyn Cache>,
        generator: Arc<dyn CodeGenerator>,
    ) -> Self {
        Self {
            key: key.into(),
            ttl,
            cache,
            generator,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stores `value` as the current code with a full validity window
    pub async fn set(&self, value: impl Into<String>) -> Result<(), CacheError> {
        // Drop first so the old entry's TTL is never carried over
        self.cache.forget(&self.key).await?;
        self.cache
            .put(&self.key, CacheValue::String(value.into()), self.ttl)
            .await
    }

    /// Generates and stores a code of [`DEFAULT_CODE_LENGTH`] digits
    pub async fn generate(&self) -> Result<String, CacheError> {
        self.generate_n(DEFAULT_CODE_LENGTH).await
    }

    /// Generates and stores a code of `length` characters.
    ///
    /// Nothing is written when the generator fails.
    pub async fn generate_n(&self, length: usize) -> Result<String, CacheError> {
        let code = self.generator.generate(length)?;
        self.set(code.clone()).await?;

        debug!(key = %self.key, length, "Verification code issued");
        Ok(code)
    }

    /// Current code, `None` once cleared or expired
    pub async fn get(&self) -> Result<Option<String>, CacheError> {
        // Text-backed stores hand back the exact stored characters here
        let (code, found) = self.cache.string(&self.key, String::new()).await;
        if found {
            return Ok(Some(code));
        }

        // Tells a failed read apart from absence; covers entries not stored as text
        Ok(self.cache.get(&self.key).await?.and_then(render))
    }

    pub async fn exists(&self) -> Result<bool, CacheError> {
        self.cache.exists(&self.key).await
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.cache.forget(&self.key).await?;
        Ok(())
    }
}

/// Text form of a stored code. Backends that keep values as text may hand
/// digit-only codes back as integers.
fn render(value: CacheValue) -> Option<String> {
    match value {
        CacheValue::String(s) => Some(s),
        CacheValue::Int(v) => Some(v.to_string()),
        CacheValue::UInt(v) => Some(v.to_string()),
        CacheValue::Bytes(b) => String::from_utf8(b).ok(),
        other => {
            debug!(stored = other.type_name(), "Verification code entry is not text");
            None
        }
    }
}
