//! Redis-backed session cache.
//!
//! Holds in-flight upload sessions between chunks. A multiplexed
//! `ConnectionManager` is cloned per operation; reconnection is handled
//! underneath it. Connectivity is probed at construction so a bad Redis
//! URL fails the bootstrap, not the first chunk of somebody's upload.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use crate::cache::{CacheError, CacheResult, CacheService};
use crate::config::RedisConfig;

#[derive(Clone)]
pub struct RedisCacheService {
    manager: ConnectionManager,
}

impl std::fmt::Debug for RedisCacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheService").finish_non_exhaustive()
    }
}

impl RedisCacheService {
    pub async fn from_config(config: &RedisConfig) -> CacheResult<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| CacheError::ConnectionError(format!("invalid Redis URL: {e}")))?;

        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::ConnectionError(format!("Redis unreachable: {e}")))?;

        let service = Self { manager };
        service.ping().await?;
        debug!("session cache connected");

        Ok(service)
    }

    async fn ping(&self) -> CacheResult<String> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .arg("rsvp")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::ConnectionError(format!("Redis PING failed: {e}")))
    }
}

#[async_trait]
impl CacheService for RedisCacheService {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| CacheError::BackendError(format!("session read {key}: {e}")))?;

        debug!(key = key, found = value.is_some(), "session cache get");
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        // Sessions must always expire; an unbounded SET would leak
        // abandoned uploads forever.
        let ttl_seconds = ttl.as_secs().max(1);

        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds)
            .await
            .map_err(|e| CacheError::BackendError(format!("session write {key}: {e}")))?;

        debug!(key = key, ttl_seconds = ttl_seconds, "session cache set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| CacheError::BackendError(format!("session delete {key}: {e}")))?;

        debug!(key = key, "session cache delete");
        Ok(())
    }

    async fn health_check(&self) -> CacheResult<bool> {
        // PING with an argument echoes it back; anything else means the
        // connection is talking to something that is not behaving.
        Ok(self.ping().await? == "rsvp")
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }
}
