//! # Redis Cache Store
//!
//! Redis-backed [`CacheStore`]. One multiplexed connection manager is created at
//! registration and cloned into every operation, so overlapping requests share
//! it without locking. Every round trip is bounded by the configured operation
//! timeout.

use super::CacheStore;
use crate::core::config::StoreConfig;
use crate::core::error::{CacheError, CacheResult};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info};

/// Redis cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisCacheConfig {
    /// Redis connection URL
    pub url: String,

    /// Connection timeout
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,

    /// Bound on each GET/SET/DEL round trip
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Key prefix for all cache entries
    pub key_prefix: String,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            connection_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(1),
            key_prefix: String::new(),
        }
    }
}

impl From<&StoreConfig> for RedisCacheConfig {
    fn from(store: &StoreConfig) -> Self {
        Self {
            url: store.redis_url(),
            connection_timeout: store.connection_timeout,
            operation_timeout: store.operation_timeout,
            key_prefix: store.key_prefix.clone(),
        }
    }
}

/// Redis cache implementation
#[derive(Clone)]
pub struct RedisCache {
    /// Configuration
    config: RedisCacheConfig,

    /// Redis connection manager, reconnects on its own after a dropped connection
    connection_manager: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis.
    ///
    /// Fails with [`CacheError::Registration`] if the server cannot be reached
    /// within the connection timeout or does not answer `PING`. There is no retry.
    pub async fn connect(config: RedisCacheConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| CacheError::registration(format!("Invalid Redis URL: {}", e)))?;

        let connection_manager = tokio::time::timeout(
            config.connection_timeout,
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| {
            CacheError::registration(format!(
                "Timed out connecting to Redis after {:?}",
                config.connection_timeout
            ))
        })?
        .map_err(|e| CacheError::registration(format!("Failed to connect to Redis: {}", e)))?;

        let cache = Self {
            config,
            connection_manager,
        };

        if !cache.health_check().await.map_err(|e| CacheError::registration(e.to_string()))? {
            return Err(CacheError::registration("Redis did not answer PING"));
        }

        info!("Redis cache connected");
        Ok(cache)
    }

    /// Get the full cache key with prefix
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// Run one Redis operation on a clone of the shared connection, bounded by the operation timeout
    async fn execute<T, F, Fut>(&self, operation: F) -> CacheResult<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let conn = self.connection_manager.clone();

        match tokio::time::timeout(self.config.operation_timeout, operation(conn)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                error!("Redis operation failed: {}", e);
                Err(CacheError::Connectivity(e))
            }
            Err(_) => {
                error!("Redis operation timed out after {:?}", self.config.operation_timeout);
                Err(CacheError::timeout(self.config.operation_timeout))
            }
        }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn fetch(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let full_key = self.full_key(key);

        let value = self
            .execute(|mut conn| async move { conn.get::<_, Option<Vec<u8>>>(&full_key).await })
            .await?;

        match &value {
            Some(_) => debug!("Redis cache hit for key: {}", key),
            None => debug!("Redis cache miss for key: {}", key),
        }

        Ok(value)
    }

    async fn store(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let full_key = self.full_key(key);
        // Redis rejects EX 0
        let ttl_seconds = ttl.as_secs().max(1);
        let value = value.to_vec();

        self.execute(|mut conn| async move {
            redis::cmd("SET")
                .arg(&full_key)
                .arg(value)
                .arg("EX")
                .arg(ttl_seconds)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await?;

        debug!("Set Redis cache key: {} with TTL: {}s", key, ttl_seconds);
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<bool> {
        let full_key = self.full_key(key);

        let deleted_count: i64 = self
            .execute(|mut conn| async move { conn.del(&full_key).await })
            .await?;

        let was_deleted = deleted_count > 0;
        if was_deleted {
            debug!("Deleted Redis cache key: {}", key);
        }

        Ok(was_deleted)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let response: String = self
            .execute(|mut conn| async move {
                redis::cmd("PING").query_async::<_, String>(&mut conn).await
            })
            .await?;

        Ok(response == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string())
    }

    async fn setup_redis_cache() -> RedisCache {
        let config = RedisCacheConfig {
            url: redis_url(),
            key_prefix: "output-cache-test:".to_string(),
            ..Default::default()
        };

        RedisCache::connect(config).await.unwrap()
    }

    #[test]
    fn test_config_from_store_config() {
        let store = StoreConfig {
            host: "10.1.2.3".to_string(),
            port: 1234,
            key_prefix: "api:".to_string(),
            ..Default::default()
        };

        let config = RedisCacheConfig::from(&store);
        assert_eq!(config.url, "redis://10.1.2.3:1234/0");
        assert_eq!(config.key_prefix, "api:");
        assert_eq!(config.operation_timeout, store.operation_timeout);
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_server_fails_registration() {
        let config = RedisCacheConfig {
            // Port 1 on loopback refuses connections
            url: "redis://127.0.0.1:1/0".to_string(),
            connection_timeout: Duration::from_millis(500),
            ..Default::default()
        };

        let result = RedisCache::connect(config).await;
        assert!(matches!(result, Err(CacheError::Registration { .. })));
    }

    #[tokio::test]
    async fn test_invalid_url_fails_registration() {
        let config = RedisCacheConfig {
            url: "not-a-redis-url".to_string(),
            ..Default::default()
        };

        let result = RedisCache::connect(config).await;
        assert!(matches!(result, Err(CacheError::Registration { .. })));
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis at REDIS_URL
    async fn test_basic_operations() {
        let cache = setup_redis_cache().await;

        let key = "get|/resources/1";
        let value = b"test_value";
        let ttl = Duration::from_secs(60);

        cache.remove(key).await.unwrap();
        assert_eq!(cache.fetch(key).await.unwrap(), None);

        cache.store(key, value, ttl).await.unwrap();
        assert_eq!(cache.fetch(key).await.unwrap(), Some(value.to_vec()));

        assert!(cache.remove(key).await.unwrap());
        assert!(!cache.remove(key).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis at REDIS_URL
    async fn test_ttl_expiration() {
        let cache = setup_redis_cache().await;

        let key = "get|/expiring";
        cache.store(key, b"expire_value", Duration::from_secs(1)).await.unwrap();
        assert!(cache.fetch(key).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(2100)).await;

        assert_eq!(cache.fetch(key).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis at REDIS_URL
    async fn test_health_check() {
        let cache = setup_redis_cache().await;
        assert!(cache.health_check().await.unwrap());
    }
}
