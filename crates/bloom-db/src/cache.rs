//! Redis key-value store for revocations, rate limiting, and identity caching

use async_trait::async_trait;
use deadpool_redis::{
    redis::{self, AsyncCommands, Script},
    Pool as RedisPool,
};
use std::sync::OnceLock;
use std::time::Duration;

use crate::{DbError, DbResult};

/// Cache key prefixes
pub mod keys {
    pub const TOKEN_BLACKLIST: &str = "token_blacklist:";
    pub const USER_BLACKLIST: &str = "user_blacklist:";
    pub const USER_CACHE: &str = "user_cache:";
    pub const RATE_LIMIT: &str = "rate_limit:";
}

/// Default TTLs
pub mod ttl {
    use std::time::Duration;

    pub const USER_CACHE: Duration = Duration::from_secs(300); // 5 minutes
    pub const USER_BLACKLIST: Duration = Duration::from_secs(7 * 24 * 60 * 60); // 7 days
}

/// State of one sliding window after a check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    /// Whether the request was admitted and recorded
    pub admitted: bool,
    /// Requests inside the window, including this one if admitted
    pub count: u64,
    /// Score (unix millis) of the oldest request still in the window
    pub oldest_ms: Option<i64>,
}

/// The shared TTL-capable store behind revocation, rate limiting, and the identity cache.
///
/// Every method is a single round trip. Multi-step operations (the sliding
/// window) execute atomically on the server.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// SET with expiry
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> DbResult<()>;

    async fn get(&self, key: &str) -> DbResult<Option<String>>;

    async fn exists(&self, key: &str) -> DbResult<bool>;

    /// Returns whether a key was removed
    async fn delete(&self, key: &str) -> DbResult<bool>;

    /// Delete every key starting with `prefix`, returns the number removed
    async fn delete_prefix(&self, prefix: &str) -> DbResult<u64>;

    /// Count keys starting with `prefix`
    async fn count_prefix(&self, prefix: &str) -> DbResult<u64>;

    /// Prune entries at or before `now_ms - window`, then record `now_ms`
    /// only if fewer than `limit` entries remain.
    async fn window_admit(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        limit: u64,
    ) -> DbResult<WindowOutcome>;

    /// Inspect a window without pruning or recording
    async fn window_peek(&self, key: &str, now_ms: i64, window: Duration) -> DbResult<WindowOutcome>;

    async fn ping(&self) -> DbResult<()>;
}

const SLIDING_WINDOW_LUA: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
local admitted = 0
if count < limit then
    redis.call('ZADD', key, now, ARGV[4])
    redis.call('PEXPIRE', key, window)
    count = count + 1
    admitted = 1
end

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
local oldest_score = -1
if oldest[2] then
    oldest_score = tonumber(oldest[2])
end
return {admitted, count, oldest_score}
"#;

fn sliding_window_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(SLIDING_WINDOW_LUA))
}

/// Redis-backed [`KvStore`]
#[derive(Clone)]
pub struct CacheManager {
    pool: RedisPool,
}

impl CacheManager {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    async fn scan_prefix(&self, prefix: &str) -> DbResult<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut found = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await?;
            found.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(found)
    }
}

#[async_trait]
impl KvStore for CacheManager {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> DbResult<()> {
        let mut conn = self.pool.get().await?;
        // PSETEX rejects a zero expiry
        let millis = (ttl.as_millis() as u64).max(1);
        conn.pset_ex::<_, _, ()>(key, value, millis).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn exists(&self, key: &str) -> DbResult<bool> {
        let mut conn = self.pool.get().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn delete(&self, key: &str) -> DbResult<bool> {
        let mut conn = self.pool.get().await?;
        let deleted: i64 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    async fn delete_prefix(&self, prefix: &str) -> DbResult<u64> {
        let keys = self.scan_prefix(prefix).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.pool.get().await?;
        let mut deleted: u64 = 0;
        for chunk in keys.chunks(500) {
            let n: i64 = conn.del(chunk).await?;
            deleted += n.max(0) as u64;
        }
        Ok(deleted)
    }

    async fn count_prefix(&self, prefix: &str) -> DbResult<u64> {
        Ok(self.scan_prefix(prefix).await?.len() as u64)
    }

    async fn window_admit(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        limit: u64,
    ) -> DbResult<WindowOutcome> {
        let mut conn = self.pool.get().await?;
        let member = format!("{}-{:08x}", now_ms, rand::random::<u32>());

        let (admitted, count, oldest): (i64, i64, i64) = sliding_window_script()
            .key(key)
            .arg(now_ms)
            .arg(window.as_millis() as i64)
            .arg(limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;

        Ok(WindowOutcome {
            admitted: admitted == 1,
            count: count.max(0) as u64,
            oldest_ms: (oldest >= 0).then_some(oldest),
        })
    }

    async fn window_peek(&self, key: &str, now_ms: i64, window: Duration) -> DbResult<WindowOutcome> {
        let mut conn = self.pool.get().await?;
        let lower = format!("({}", now_ms - window.as_millis() as i64);

        let (count, oldest): (u64, Vec<(String, f64)>) = redis::pipe()
            .cmd("ZCOUNT")
            .arg(key)
            .arg(&lower)
            .arg("+inf")
            .cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(&lower)
            .arg("+inf")
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(0)
            .arg(1)
            .query_async(&mut conn)
            .await?;

        Ok(WindowOutcome {
            admitted: false,
            count,
            oldest_ms: oldest.first().map(|(_, score)| *score as i64),
        })
    }

    async fn ping(&self) -> DbResult<()> {
        let mut conn = self.pool.get().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(DbError::Kv(format!("unexpected PING reply: {}", pong)));
        }
        Ok(())
    }
}
