//! cachekit
//!
//! A uniform cache contract with interchangeable storage backends:
//! - Disk cache with one JSON file per entry and lazy expiry
//! - Redis cache over a bounded connection pool
//! - Typed accessors with fallbacks and atomic counters
//! - Attempt-counting rate limiter and verification codes on top of any backend

pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{Cache, CacheError, CacheValue, Number};
pub use infrastructure::{
    CacheConfig, CacheFactory, CacheType, DiskCache, RateLimiter, RedisCache, VerificationCode,
};
