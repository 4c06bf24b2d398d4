//! Two-tier cache: a process-local TTL map with an optional Redis mirror.
//!
//! Values are stored as JSON strings in both tiers. Redis is best effort:
//! every Redis failure is logged and treated as a miss.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use canopy_core::{TenantScope, UserId};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

/// Key prefix shared by every cached loyalty configuration.
pub const CONFIG_PREFIX: &str = "loyalty:config:";

/// Key prefix shared by every cached account balance.
pub const BALANCE_PREFIX: &str = "loyalty:balance:";

/// Cache key for a scope's loyalty configuration.
#[must_use]
pub fn config_key(scope: &TenantScope) -> String {
    format!("{CONFIG_PREFIX}{}", scope.cache_segment())
}

/// Cache key for a user's account snapshot.
#[must_use]
pub fn balance_key(user_id: &UserId) -> String {
    format!("{BALANCE_PREFIX}{user_id}")
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local cache with an optional shared Redis tier.
pub struct TieredCache {
    local: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
    redis: Option<ConnectionManager>,
}

impl TieredCache {
    /// Create a local-only cache.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            local: RwLock::new(HashMap::new()),
            ttl,
            redis: None,
        }
    }

    /// Attach a Redis connection as the shared tier.
    #[must_use]
    pub fn with_redis(mut self, conn: ConnectionManager) -> Self {
        self.redis = Some(conn);
        self
    }

    /// Connect to Redis for use with [`TieredCache::with_redis`].
    ///
    /// # Errors
    ///
    /// Returns the Redis error if the URL is invalid or the server is unreachable.
    pub async fn connect_redis(url: &str) -> Result<ConnectionManager, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!(url = %url, "Connected to Redis");
        Ok(conn)
    }

    /// Whether a Redis tier is attached.
    #[must_use]
    pub fn has_redis(&self) -> bool {
        self.redis.is_some()
    }

    /// Look up `key`, falling back to Redis and backfilling the local tier.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        {
            let local = self.local.read().await;
            if let Some(entry) = local.get(key) {
                if entry.expires_at > Instant::now() {
                    return decode(key, &entry.value);
                }
            }
        }

        let mut conn = self.redis.clone()?;
        let raw: Option<String> = match conn.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Redis GET failed");
                return None;
            }
        };
        let raw = raw?;
        let value = decode(key, &raw)?;
        self.insert_local(key, raw).await;
        Some(value)
    }

    /// Store `value` under `key` in both tiers.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache value not serializable");
                return;
            }
        };

        if let Some(mut conn) = self.redis.clone() {
            let result: redis::RedisResult<()> =
                conn.set_ex(key, raw.as_str(), self.ttl.as_secs().max(1)).await;
            if let Err(e) = result {
                tracing::warn!(key = %key, error = %e, "Redis SET failed");
            }
        }

        self.insert_local(key, raw).await;
    }

    /// Drop one key from both tiers.
    pub async fn invalidate(&self, key: &str) {
        self.local.write().await.remove(key);

        if let Some(mut conn) = self.redis.clone() {
            let result: redis::RedisResult<()> = conn.del(key).await;
            if let Err(e) = result {
                tracing::warn!(key = %key, error = %e, "Redis DEL failed");
            }
        }
    }

    /// Drop every key matching a `*` glob from both tiers.
    ///
    /// Returns the number of local entries removed.
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let removed = {
            let mut local = self.local.write().await;
            let before = local.len();
            local.retain(|key, _| !glob_match(pattern, key));
            before - local.len()
        };

        if let Some(mut conn) = self.redis.clone() {
            match scan_keys(&mut conn, pattern).await {
                Ok(keys) if !keys.is_empty() => {
                    let result: redis::RedisResult<()> = conn.del(keys).await;
                    if let Err(e) = result {
                        tracing::warn!(pattern = %pattern, error = %e, "Redis DEL failed");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(pattern = %pattern, error = %e, "Redis SCAN failed"),
            }
        }

        tracing::debug!(pattern = %pattern, removed, "Cache pattern invalidated");
        removed
    }

    async fn insert_local(&self, key: &str, value: String) {
        let mut local = self.local.write().await;
        let now = Instant::now();
        local.retain(|_, entry| entry.expires_at > now);
        local.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }
}

/// Collect keys matching `pattern` with incremental `SCAN` cursors.
async fn scan_keys(
    conn: &mut ConnectionManager,
    pattern: &str,
) -> redis::RedisResult<Vec<String>> {
    let mut iter = conn.scan_match::<_, String>(pattern).await?;
    let mut keys = Vec::new();
    while let Some(key) = iter.next_item().await {
        keys.push(key);
    }
    Ok(keys)
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    serde_json::from_str(raw)
        .map_err(|e| tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry"))
        .ok()
}

/// Match `key` against a pattern where `*` spans any run of characters.
#[must_use]
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };

    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        // No `*` at all: exact match.
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
