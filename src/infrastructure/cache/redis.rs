//! Redis cache implementation

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::{ErrorKind, RedisError, RedisResult, Script, Value};

use super::pool::{PoolConfig, RedisPool};
use crate::domain::cache::{coerce, Cache, CacheValue, KeyPrefix, Number, FOREVER};
use crate::domain::CacheError;

/// Runs a counter command only when the key already exists, so a missing
/// key is reported instead of being created at zero.
const COUNTER_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return false
end
return redis.call(ARGV[1], KEYS[1], ARGV[2])
"#;

/// Configuration for Redis cache
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    /// Redis address, `host:port` or `redis://...`
    pub host: String,
    /// Key prefix for namespacing
    pub prefix: String,
    /// Logical database index
    pub db: u8,
    /// Idle connections kept in the pool
    pub max_idle: usize,
    /// Connections in use at once, 0 for no limit
    pub max_active: usize,
    /// Connection timeout
    pub connection_timeout: Duration,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        let pool = PoolConfig::default();
        Self {
            host: pool.host,
            prefix: String::new(),
            db: pool.db,
            max_idle: pool.max_idle,
            max_active: pool.max_active,
            connection_timeout: pool.connection_timeout,
        }
    }
}

impl RedisCacheConfig {
    /// Creates a new configuration for the given host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Sets the key prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the database index
    pub fn with_db(mut self, db: u8) -> Self {
        self.db = db;
        self
    }

    /// Sets pool sizing
    pub fn with_pool_size(mut self, max_idle: usize, max_active: usize) -> Self {
        self.max_idle = max_idle;
        self.max_active = max_active;
        self
    }

    /// Sets the connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            host: self.host.clone(),
            db: self.db,
            max_idle: self.max_idle,
            max_active: self.max_active,
            connection_timeout: self.connection_timeout,
        }
    }
}

/// Redis cache implementation
///
/// Expiry, `pull`, `add` and the counter operations are delegated to Redis and
/// are atomic with respect to every other client of the same server. Values
/// are stored as plain text so native counters work on them; the type of a
/// value read back is inferred from that text.
pub struct RedisCache {
    prefix: KeyPrefix,
    pool: RedisPool,
    counter_script: Script,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("prefix", &self.prefix)
            .field("pool", &self.pool)
            .finish()
    }
}

impl RedisCache {
    /// Creates a Redis cache; connections are opened lazily by the pool
    pub fn new(config: RedisCacheConfig) -> Result<Self, CacheError> {
        let pool = RedisPool::new(config.pool_config())?;

        tracing::info!(
            host = %config.host,
            db = config.db,
            prefix = %config.prefix,
            "Redis cache configured"
        );

        Ok(Self {
            prefix: KeyPrefix::new(config.prefix),
            pool,
            counter_script: Script::new(COUNTER_SCRIPT),
        })
    }

    pub fn prefix(&self) -> &str {
        self.prefix.as_str()
    }

    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let prefixed_key = self.prefix.apply(key);
        let mut conn = self.pool.get().await?;

        let result: RedisResult<Option<Vec<u8>>> = redis::cmd("GET")
            .arg(&prefixed_key)
            .query_async(&mut *conn)
            .await;

        conn.check(result).map_err(|e| command_error("get", key, e))
    }

    async fn write(
        &self,
        key: &str,
        value: &CacheValue,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        storable(key, value)?;
        let prefixed_key = self.prefix.apply(key);
        let mut conn = self.pool.get().await?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(&prefixed_key).arg(encode(value));
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }

        let result: RedisResult<()> = cmd.query_async(&mut *conn).await;
        conn.check(result).map_err(|e| command_error("set", key, e))
    }

    async fn counter(&self, key: &str, command: &str, delta: Number) -> Result<bool, CacheError> {
        let prefixed_key = self.prefix.apply(key);
        let mut conn = self.pool.get().await?;

        let result: RedisResult<Value> = self
            .counter_script
            .key(&prefixed_key)
            .arg(command)
            .arg(delta.to_string())
            .invoke_async(&mut *conn)
            .await;

        match conn.check(result) {
            Ok(Value::Nil) => {
                tracing::debug!(key, "Counter update on missing key");
                Ok(false)
            }
            Ok(_) => Ok(true),
            Err(e) if is_rejected(&e) => {
                tracing::debug!(key, error = %e, "Counter update rejected");
                Ok(false)
            }
            Err(e) => Err(command_error("update counter", key, e)),
        }
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn put(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<(), CacheError> {
        self.write(key, &value, Some(ttl)).await
    }

    async fn put_forever(&self, key: &str, value: CacheValue) -> Result<(), CacheError> {
        self.write(key, &value, None).await
    }

    async fn add(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<bool, CacheError> {
        storable(key, &value)?;
        let prefixed_key = self.prefix.apply(key);
        let mut conn = self.pool.get().await?;

        // Redis returns "OK" if set, nil if the key existed
        let result: RedisResult<Option<String>> = redis::cmd("SET")
            .arg(&prefixed_key)
            .arg(encode(&value))
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut *conn)
            .await;

        let reply = conn.check(result).map_err(|e| command_error("add", key, e))?;
        Ok(reply.is_some())
    }

    async fn set(&self, key: &str, value: CacheValue) -> Result<bool, CacheError> {
        storable(key, &value)?;
        let prefixed_key = self.prefix.apply(key);
        let mut conn = self.pool.get().await?;

        let result: RedisResult<Option<String>> = redis::cmd("SET")
            .arg(&prefixed_key)
            .arg(encode(&value))
            .arg("XX")
            .arg("KEEPTTL")
            .query_async(&mut *conn)
            .await;

        let reply = conn.check(result).map_err(|e| command_error("set", key, e))?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
        Ok(self.get_raw(key).await?.map(decode))
    }

    async fn pull(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
        let prefixed_key = self.prefix.apply(key);
        let mut conn = self.pool.get().await?;

        let result: RedisResult<(Option<Vec<u8>>, i64)> = redis::pipe()
            .atomic()
            .get(&prefixed_key)
            .del(&prefixed_key)
            .query_async(&mut *conn)
            .await;

        let (value, _) = conn.check(result).map_err(|e| command_error("pull", key, e))?;
        Ok(value.map(decode))
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let prefixed_key = self.prefix.apply(key);
        let mut conn = self.pool.get().await?;

        let result: RedisResult<i64> = redis::cmd("EXISTS")
            .arg(&prefixed_key)
            .query_async(&mut *conn)
            .await;

        let count = conn
            .check(result)
            .map_err(|e| command_error("check existence of", key, e))?;
        Ok(count > 0)
    }

    async fn forget(&self, key: &str) -> Result<bool, CacheError> {
        let prefixed_key = self.prefix.apply(key);
        let mut conn = self.pool.get().await?;

        let result: RedisResult<i64> = redis::cmd("DEL")
            .arg(&prefixed_key)
            .query_async(&mut *conn)
            .await;

        let deleted = conn.check(result).map_err(|e| command_error("delete", key, e))?;
        Ok(deleted > 0)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let prefixed_key = self.prefix.apply(key);
        let mut conn = self.pool.get().await?;

        let result: RedisResult<i64> = redis::cmd("PTTL")
            .arg(&prefixed_key)
            .query_async(&mut *conn)
            .await;

        let millis = conn
            .check(result)
            .map_err(|e| command_error("get TTL for", key, e))?;

        // -2: key missing, -1: present without expiry
        Ok(match millis {
            -1 => Some(FOREVER),
            ms if ms > 0 => Some(Duration::from_millis(ms as u64)),
            _ => None,
        })
    }

    async fn increment_by(&self, key: &str, delta: Number) -> Result<bool, CacheError> {
        let command = if delta.is_float() { "INCRBYFLOAT" } else { "INCRBY" };
        self.counter(key, command, delta).await
    }

    async fn decrement_by(&self, key: &str, delta: Number) -> Result<bool, CacheError> {
        // No native float decrement
        match delta {
            Number::Float(_) => match delta.checked_neg() {
                Some(negated) => self.counter(key, "INCRBYFLOAT", negated).await,
                None => Ok(false),
            },
            Number::Int(_) => self.counter(key, "DECRBY", delta).await,
        }
    }

    async fn bool(&self, key: &str, fallback: bool) -> (bool, bool) {
        let raw = self.get_raw(key).await.map(|v| v.map(CacheValue::Bytes));
        coerce(key, raw, fallback, |v| v.as_bytes().and_then(parse_bool))
    }

    async fn string(&self, key: &str, fallback: String) -> (String, bool) {
        let raw = self.get_raw(key).await.map(|v| v.map(CacheValue::Bytes));
        coerce(key, raw, fallback, |v| {
            v.as_bytes()
                .and_then(|b| std::str::from_utf8(b).ok())
                .map(str::to_string)
        })
    }

    async fn bytes(&self, key: &str, fallback: Vec<u8>) -> (Vec<u8>, bool) {
        let raw = self.get_raw(key).await.map(|v| v.map(CacheValue::Bytes));
        coerce(key, raw, fallback, |v| v.as_bytes().map(<[u8]>::to_vec))
    }
}

fn storable(key: &str, value: &CacheValue) -> Result<(), CacheError> {
    if value.is_storable() {
        Ok(())
    } else {
        Err(CacheError::serialization(format!(
            "Cannot store non-finite {} value for key '{}'",
            value.type_name(),
            key
        )))
    }
}

fn command_error(op: &str, key: &str, e: RedisError) -> CacheError {
    CacheError::remote(format!("Failed to {} key '{}': {}", op, key, e))
}

/// Errors Redis returns for a well-formed command it refuses, e.g. INCR on text
fn is_rejected(e: &RedisError) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ResponseError | ErrorKind::ExtensionError | ErrorKind::TypeError
    )
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.min(FOREVER).as_millis())
        .unwrap_or(u64::MAX)
        .max(1)
}

fn encode(value: &CacheValue) -> Vec<u8> {
    match value {
        CacheValue::Bool(v) => if *v { b"1".to_vec() } else { b"0".to_vec() },
        CacheValue::Int(v) => v.to_string().into_bytes(),
        CacheValue::UInt(v) => v.to_string().into_bytes(),
        CacheValue::Float(v) => v.to_string().into_bytes(),
        CacheValue::String(v) => v.clone().into_bytes(),
        CacheValue::Bytes(v) => v.clone(),
    }
}

fn decode(raw: Vec<u8>) -> CacheValue {
    let text = match String::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => return CacheValue::Bytes(e.into_bytes()),
    };

    // Only canonical numbers; "007", "+5" or oversized digit runs stay text
    if let Ok(v) = text.parse::<i64>() {
        if v.to_string() == text {
            return CacheValue::Int(v);
        }
    }
    if let Ok(v) = text.parse::<u64>() {
        if v.to_string() == text {
            return CacheValue::UInt(v);
        }
    }
    if looks_like_float(&text) {
        if let Ok(v) = text.parse::<f64>() {
            if v.is_finite() {
                return CacheValue::Float(v);
            }
        }
    }

    CacheValue::String(text)
}

/// Text Redis could have produced from a float: a fraction or an exponent,
/// no leading zeros in the integer part. Rust's parser alone would also take
/// "inf", "NaN" and bare digit strings.
fn looks_like_float(text: &str) -> bool {
    if !text.contains(['.', 'e', 'E']) {
        return false;
    }
    if !text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
    {
        return false;
    }

    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let whole = unsigned
        .split(['.', 'e', 'E'])
        .next()
        .unwrap_or_default();
    !whole.is_empty() && (whole == "0" || !whole.starts_with('0'))
}

fn parse_bool(raw: &[u8]) -> Option<bool> {
    match raw {
        b"1" | b"t" | b"T" | b"true" | b"TRUE" | b"True" => Some(true),
        b"0" | b"f" | b"F" | b"false" | b"FALSE" | b"False" => Some(false),
        _ => None,
    }
}
