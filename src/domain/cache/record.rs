//! Stored record: a value plus its absolute expiry

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value::CacheValue;
use crate::domain::CacheError;

/// Lifetime given to entries written without a TTL (100 years).
pub const FOREVER: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Cache record as persisted by backends without native expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub expires_at: DateTime<Utc>,
    pub value: CacheValue,
}

impl CacheRecord {
    /// Creates a record expiring `ttl` from now; TTLs past `FOREVER` are clamped
    pub fn new(value: CacheValue, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl.min(FOREVER))
            .unwrap_or_else(|_| chrono::Duration::days(100 * 365));

        Self {
            expires_at: Utc::now() + ttl,
            value,
        }
    }

    pub fn forever(value: CacheValue) -> Self {
        Self::new(value, FOREVER)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Time left before expiry, `None` once expired
    pub fn remaining(&self) -> Option<Duration> {
        (self.expires_at - Utc::now())
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
    }

    /// JSON form; fails for values JSON cannot carry back (NaN, infinities)
    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        if !self.value.is_storable() {
            return Err(CacheError::serialization(format!(
                "Cannot store non-finite {} value",
                self.value.type_name()
            )));
        }
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, CacheError> {
        Ok(serde_json::from_slice(data)?)
    }
}
