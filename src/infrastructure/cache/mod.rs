//! Cache infrastructure - Cache implementations

mod disk;
mod factory;
mod pool;
mod redis;

pub use disk::{DiskCache, DiskCacheConfig};
pub use factory::{CacheConfig, CacheFactory, CacheType};
pub use pool::{PoolConfig, PooledConnection, RedisPool};
pub use self::redis::{RedisCache, RedisCacheConfig};
