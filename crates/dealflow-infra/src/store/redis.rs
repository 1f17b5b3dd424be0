//! Redis counter store - the shared store every service instance coordinates
//! through.
//!
//! Counter increments and bucket refills run as Lua scripts so each one is a
//! single atomic step on the server. Requires Redis 5 or newer (scripts call
//! `TIME` before writing).

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, RedisResult, Script};

use dealflow_core::domain::{BucketOutcome, BucketSpec};
use dealflow_core::env::parse_flag;
use dealflow_core::ports::{Counter, CounterStore, StoreError};

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Upper bound on every individual store operation
    pub command_timeout: Duration,
    /// Whether to fall back to the in-memory store if Redis is unreachable at boot
    pub fallback_to_memory: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_millis(50),
            fallback_to_memory: true,
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            command_timeout: Duration::from_millis(
                std::env::var("REDIS_COMMAND_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(50),
            ),
            fallback_to_memory: std::env::var("REDIS_FALLBACK_TO_MEMORY")
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(true),
        }
    }
}

// Returns: [current_count, pttl_ms]
const INCR_SCRIPT: &str = r#"
local key = KEYS[1]
local by = tonumber(ARGV[1])
local ttl_ms = tonumber(ARGV[2])

if by < 0 and redis.call('EXISTS', key) == 0 then
    return {0, -2}
end

local current = redis.call('INCRBY', key, by)
local pttl = redis.call('PTTL', key)
if pttl < 0 and by > 0 then
    redis.call('PEXPIRE', key, ttl_ms)
    pttl = ttl_ms
end

return {current, pttl}
"#;

// Returns: [allowed (0|1), tokens_left as string]
// Lua numbers are truncated to integers in replies, hence the tostring.
const BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local initial_tokens = tonumber(ARGV[1])
local max_tokens = tonumber(ARGV[2])
local refill_per_sec = tonumber(ARGV[3])
local idle_ttl_ms = tonumber(ARGV[4])

local time = redis.call('TIME')
local now_ms = tonumber(time[1]) * 1000 + math.floor(tonumber(time[2]) / 1000)

local state = redis.call('HMGET', key, 'tokens', 'ts')
local tokens = tonumber(state[1])
local ts = tonumber(state[2])
if tokens == nil or ts == nil then
    tokens = math.min(initial_tokens, max_tokens)
    ts = now_ms
end

local elapsed = math.max(0, now_ms - ts) / 1000
tokens = math.max(0, math.min(max_tokens, tokens + elapsed * refill_per_sec))

local allowed = 0
if tokens >= 1 then
    tokens = tokens - 1
    allowed = 1
end

redis.call('HSET', key, 'tokens', tostring(tokens), 'ts', math.max(ts, now_ms))
redis.call('PEXPIRE', key, idle_ttl_ms)

return {allowed, tostring(tokens)}
"#;

/// Redis-backed counter store.
///
/// Uses connection manager for automatic reconnection. Every call is bounded
/// by `command_timeout` so a degraded Redis surfaces as a fast error.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    config: RedisConfig,
    incr_script: Script,
    bucket_script: Script,
}

impl RedisCounterStore {
    pub async fn new(config: RedisConfig) -> Result<Self, StoreError> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| StoreError::Connection(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| StoreError::Connection("Connection timed out".to_string()))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!(
            url = %config.url,
            command_timeout_ms = config.command_timeout.as_millis() as u64,
            "Connected to Redis counter store"
        );

        Ok(Self {
            conn,
            config,
            incr_script: Script::new(INCR_SCRIPT),
            bucket_script: Script::new(BUCKET_SCRIPT),
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(RedisConfig::from_env()).await
    }

    /// Run one store operation under the command timeout.
    async fn run<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = RedisResult<T>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.config.command_timeout, fut).await {
            Ok(result) => result.map_err(map_redis_error),
            Err(_) => Err(StoreError::Timeout {
                op,
                timeout: self.config.command_timeout,
            }),
        }
    }
}

fn map_redis_error(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

fn millis(d: Duration) -> u64 {
    (d.as_millis() as u64).max(1)
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = self
            .run("ping", async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        self.run("get", async move { conn.get::<_, Option<String>>(key).await })
            .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(duration) => {
                self.run("set", async move {
                    conn.pset_ex::<_, _, ()>(key, value, millis(duration)).await
                })
                .await
            }
            None => {
                self.run("set", async move { conn.set::<_, _, ()>(key, value).await })
                    .await
            }
        }
    }

    async fn incr(&self, key: &str, by: i64, ttl: Duration) -> Result<Counter, StoreError> {
        let mut conn = self.conn.clone();
        let script = &self.incr_script;

        let reply: Vec<i64> = self
            .run("incr", async move {
                script
                    .key(key)
                    .arg(by)
                    .arg(millis(ttl))
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        let value = reply.first().copied().unwrap_or(0);
        let pttl = reply.get(1).copied().unwrap_or(-2);

        Ok(Counter {
            value,
            ttl: (pttl >= 0).then(|| Duration::from_millis(pttl as u64)),
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: u64 = self
            .run("delete", async move { conn.del::<_, u64>(key).await })
            .await?;
        Ok(removed > 0)
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
        // SCAN instead of KEYS so a large keyspace never stalls the server.
        let mut cursor: u64 = 0;
        let mut removed = 0;

        loop {
            let mut conn = self.conn.clone();
            let (next, keys): (u64, Vec<String>) = self
                .run("scan", async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(200)
                        .query_async(&mut conn)
                        .await
                })
                .await?;

            if !keys.is_empty() {
                let mut conn = self.conn.clone();
                let count: u64 = self
                    .run("delete_by_pattern", async move {
                        redis::cmd("DEL").arg(&keys).query_async(&mut conn).await
                    })
                    .await?;
                removed += count;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(pattern = %pattern, removed, "Deleted keys by pattern");
        Ok(removed)
    }

    async fn set_add(&self, set_key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.run("set_add", async move {
            conn.sadd::<_, _, ()>(set_key, member).await
        })
        .await
    }

    async fn set_remove(&self, set_key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.run("set_remove", async move {
            conn.srem::<_, _, ()>(set_key, member).await
        })
        .await
    }

    async fn set_is_member(&self, set_key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        self.run("set_is_member", async move {
            conn.sismember::<_, _, bool>(set_key, member).await
        })
        .await
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut members: Vec<String> = self
            .run("set_members", async move {
                conn.smembers::<_, Vec<String>>(set_key).await
            })
            .await?;
        members.sort();
        Ok(members)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn.clone();
        let pttl: i64 = self
            .run("ttl", async move { conn.pttl::<_, i64>(key).await })
            .await?;
        Ok((pttl >= 0).then(|| Duration::from_millis(pttl as u64)))
    }

    async fn take_token(&self, key: &str, spec: &BucketSpec) -> Result<BucketOutcome, StoreError> {
        let mut conn = self.conn.clone();
        let script = &self.bucket_script;
        let spec = *spec;

        let (allowed, tokens): (i64, String) = self
            .run("take_token", async move {
                script
                    .key(key)
                    .arg(spec.initial_tokens)
                    .arg(spec.max_tokens)
                    .arg(spec.refill_per_sec)
                    .arg(millis(spec.idle_ttl()))
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        let tokens = tokens
            .parse::<f64>()
            .map_err(|e| StoreError::Serialization(format!("bucket tokens '{}': {}", tokens, e)))?;

        Ok(BucketOutcome {
            allowed: allowed == 1,
            tokens,
        })
    }
}
