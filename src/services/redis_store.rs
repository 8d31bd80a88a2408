use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::services::cache::{CacheError, CacheStore};

/// Pattern matching every dependency index written by [`MatchCache`](crate::services::MatchCache)
const INDEX_PATTERN: &str = "match-idx:*";

/// Redis-backed [`CacheStore`], shared across instances
///
/// Entries expire through Redis TTLs. Indexes are Redis sets whose members
/// may outlive the entries they point at; `purge_expired` prunes those.
pub struct RedisStore {
    redis: Arc<tokio::sync::Mutex<ConnectionManager>>,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(redis)),
        })
    }

    /// Health check for the Redis connection
    pub async fn health_check(&self) -> Result<bool, CacheError> {
        let mut conn = self.redis.lock().await;
        let pong: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(pong == "PONG")
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.redis.lock().await;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut *conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.redis.lock().await;
        let _: () = redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_secs(ttl))
            .arg(value)
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.redis.lock().await;
        let removed: usize = redis::cmd("DEL").arg(keys).query_async(&mut *conn).await?;
        Ok(removed)
    }

    async fn index_add(&self, index: &str, member: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.redis.lock().await;
        let _: () = redis::pipe()
            .cmd("SADD")
            .arg(index)
            .arg(member)
            .ignore()
            .cmd("EXPIRE")
            .arg(index)
            .arg(ttl_secs(ttl))
            .ignore()
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn index_members(&self, index: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.redis.lock().await;
        let members: Vec<String> = redis::cmd("SMEMBERS").arg(index).query_async(&mut *conn).await?;
        Ok(members)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut conn = self.redis.lock().await;
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", prefix))
            .query_async(&mut *conn)
            .await?;

        if keys.is_empty() {
            return Ok(0);
        }

        let entries = keys.iter().filter(|key| !key.starts_with("match-idx:")).count();
        let _: usize = redis::cmd("DEL").arg(&keys).query_async(&mut *conn).await?;

        tracing::debug!("Deleted {} keys with prefix {}", keys.len(), prefix);
        Ok(entries)
    }

    async fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut conn = self.redis.lock().await;
        let indexes: Vec<String> = redis::cmd("KEYS").arg(INDEX_PATTERN).query_async(&mut *conn).await?;

        let mut expired: HashSet<String> = HashSet::new();
        for index in indexes {
            let members: Vec<String> = redis::cmd("SMEMBERS").arg(&index).query_async(&mut *conn).await?;

            let mut dangling = Vec::new();
            for member in members {
                let exists: bool = redis::cmd("EXISTS").arg(&member).query_async(&mut *conn).await?;
                if !exists {
                    dangling.push(member);
                }
            }

            if !dangling.is_empty() {
                let _: usize = redis::cmd("SREM")
                    .arg(&index)
                    .arg(&dangling)
                    .query_async(&mut *conn)
                    .await?;
                expired.extend(dangling);
            }
        }

        Ok(expired.len())
    }
}
