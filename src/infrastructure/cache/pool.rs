//! Bounded Redis connection pool
//!
//! `max_active` caps the connections checked out at once; callers wait for a
//! free slot up to the connection timeout. Up to `max_idle` connections are
//! kept for reuse after being returned.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{Client, IntoConnectionInfo, RedisError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::domain::CacheError;

/// Pool sizing and connection parameters
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// `host:port` or a full `redis://` URL
    pub host: String,
    /// Logical database selected when a connection is opened
    pub db: u8,
    /// Idle connections kept for reuse
    pub max_idle: usize,
    /// Connections checked out at once; 0 means unbounded
    pub max_active: usize,
    /// Maximum wait for a free slot or a new connection
    pub connection_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:6379".to_string(),
            db: 0,
            max_idle: 10,
            max_active: 0,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

pub struct RedisPool {
    client: Client,
    idle: Mutex<Vec<MultiplexedConnection>>,
    slots: Arc<Semaphore>,
    config: PoolConfig,
}

impl fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisPool")
            .field("config", &self.config)
            .field("available_slots", &self.slots.available_permits())
            .finish()
    }
}

impl RedisPool {
    /// Builds the pool; no connection is opened until the first checkout
    pub fn new(config: PoolConfig) -> Result<Self, CacheError> {
        let url = if config.host.contains("://") {
            config.host.clone()
        } else {
            format!("redis://{}", config.host)
        };

        let mut info = url.as_str().into_connection_info().map_err(|e| {
            CacheError::configuration(format!("Invalid Redis host '{}': {}", config.host, e))
        })?;
        info.redis.db = i64::from(config.db);

        let client = Client::open(info)
            .map_err(|e| CacheError::configuration(format!("Failed to create Redis client: {}", e)))?;

        let slots = match config.max_active {
            0 => Semaphore::MAX_PERMITS,
            n => n,
        };

        Ok(Self {
            client,
            idle: Mutex::new(Vec::new()),
            slots: Arc::new(Semaphore::new(slots)),
            config,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Checks out a connection, reusing an idle one when available
    pub async fn get(&self) -> Result<PooledConnection<'_>, CacheError> {
        let permit = tokio::time::timeout(
            self.config.connection_timeout,
            self.slots.clone().acquire_owned(),
        )
        .await
        .map_err(|_| CacheError::remote("Timed out waiting for a free Redis connection"))?
        .map_err(|_| CacheError::remote("Redis connection pool is closed"))?;

        let reused = self.idle.lock().ok().and_then(|mut idle| idle.pop());

        let conn = match reused {
            Some(conn) => conn,
            None => {
                tracing::debug!(host = %self.config.host, db = self.config.db, "Opening Redis connection");
                tokio::time::timeout(
                    self.config.connection_timeout,
                    self.client.get_multiplexed_async_connection(),
                )
                .await
                .map_err(|_| CacheError::remote("Timed out connecting to Redis"))?
                .map_err(|e| CacheError::remote(format!("Failed to connect to Redis: {}", e)))?
            }
        };

        Ok(PooledConnection {
            conn,
            pool: self,
            broken: false,
            _permit: permit,
        })
    }

    fn release(&self, conn: MultiplexedConnection) {
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < self.config.max_idle {
                idle.push(conn);
            }
        }
    }

    #[cfg(test)]
    fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }
}

/// Connection checked out of a [`RedisPool`]; returned to it on drop
pub struct PooledConnection<'a> {
    conn: MultiplexedConnection,
    pool: &'a RedisPool,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection<'_> {
    /// Passes `result` through, marking the connection unusable on transport errors
    pub fn check<T>(&mut self, result: Result<T, RedisError>) -> Result<T, RedisError> {
        if let Err(e) = &result {
            if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
                self.broken = true;
            }
        }
        result
    }
}

impl Deref for PooledConnection<'_> {
    type Target = MultiplexedConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for PooledConnection<'_> {
    // Multiplexed connections are shared handles, so the clone is the same link
    fn drop(&mut self) {
        if !self.broken {
            self.pool.release(self.conn.clone());
        }
    }
}
