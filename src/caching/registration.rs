//! # Registration
//!
//! Builds an [`OutputCache`] from configuration. The config is validated once
//! here. [`OutputCacheBuilder::connect`] also establishes the Redis connection
//! and fails the whole registration if it cannot; nothing is retried.

use std::sync::Arc;

use tracing::info;

use super::context::RequestDescriptor;
use super::interceptor::CacheMissObserver;
use super::key_generator::{CustomKeyGenerator, DefaultKeyGenerator, KeyGenerator};
use super::middleware::OutputCacheLayer;
use super::output_cache::OutputCache;
use super::stats::CacheStats;
use super::stores::{CacheStore, RedisCache, RedisCacheConfig};
use crate::core::config::OutputCacheConfig;
use crate::core::error::{CacheError, CacheResult};

/// Builder for [`OutputCache`]
pub struct OutputCacheBuilder {
    config: OutputCacheConfig,
    key_generator: Option<Arc<dyn KeyGenerator>>,
    miss_observer: Option<Arc<dyn CacheMissObserver>>,
    store: Option<Arc<dyn CacheStore>>,
}

impl OutputCacheBuilder {
    pub fn new(config: OutputCacheConfig) -> Self {
        Self {
            config,
            key_generator: None,
            miss_observer: None,
            store: None,
        }
    }

    /// Replace the configured key strategy with custom key generation
    pub fn key_generator<K: KeyGenerator + 'static>(mut self, key_generator: K) -> Self {
        self.key_generator = Some(Arc::new(key_generator));
        self
    }

    /// Replace the configured key strategy with a closure
    pub fn key_fn<F>(self, generator_fn: F) -> Self
    where
        F: Fn(&RequestDescriptor) -> String + Send + Sync + 'static,
    {
        self.key_generator(CustomKeyGenerator::new(generator_fn))
    }

    /// Observer notified on every cache miss
    pub fn on_cache_miss<O: CacheMissObserver + 'static>(mut self, observer: O) -> Self {
        self.miss_observer = Some(Arc::new(observer));
        self
    }

    /// Use this store instead of connecting to Redis
    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build around an injected store. Fails if no store was given.
    pub fn build(self) -> CacheResult<OutputCache> {
        self.config.validate()?;

        let store = self.store.clone().ok_or_else(|| {
            CacheError::config("No store configured; inject one with store() or use connect()")
        })?;

        Ok(self.assemble(store))
    }

    /// Validate, connect to the configured Redis (unless a store was injected) and build.
    pub async fn connect(self) -> CacheResult<OutputCache> {
        self.config.validate()?;

        let store: Arc<dyn CacheStore> = match self.store.clone() {
            Some(store) => store,
            None => {
                let redis_config = RedisCacheConfig::from(&self.config.store);
                Arc::new(RedisCache::connect(redis_config).await?)
            }
        };

        info!(
            host = %self.config.store.host,
            port = self.config.store.port,
            ttl_secs = self.config.ttl,
            "Output cache registered"
        );

        Ok(self.assemble(store))
    }

    fn assemble(self, store: Arc<dyn CacheStore>) -> OutputCache {
        let key_generator = self.key_generator.unwrap_or_else(|| {
            Arc::new(DefaultKeyGenerator::new(self.config.key_strategy.clone()))
        });

        OutputCache {
            config: Arc::new(self.config),
            store,
            key_generator,
            miss_observer: self.miss_observer,
            stats: Arc::new(CacheStats::default()),
        }
    }
}

/// Validate the config, connect to Redis and return the layer to install on the host.
///
/// Errors here are fatal to startup.
pub async fn register(config: OutputCacheConfig) -> CacheResult<OutputCacheLayer> {
    let cache = OutputCacheBuilder::new(config).connect().await?;
    Ok(cache.layer())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::stores::InMemoryCache;
    use std::time::Duration;

    #[test]
    fn test_build_requires_store() {
        let result = OutputCacheBuilder::new(OutputCacheConfig::default()).build();
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
    }

    #[test]
    fn test_build_validates_config() {
        let config = OutputCacheConfig {
            ttl: 0,
            ..Default::default()
        };
        let result = OutputCacheBuilder::new(config)
            .store(Arc::new(InMemoryCache::default()))
            .build();
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
    }

    #[test]
    fn test_custom_key_fn_overrides_strategy() {
        let cache = OutputCacheBuilder::new(OutputCacheConfig::default())
            .store(Arc::new(InMemoryCache::default()))
            .key_fn(|descriptor: &RequestDescriptor| format!("custom|{}", descriptor.path()))
            .build()
            .unwrap();

        let descriptor = RequestDescriptor::new("GET", "/resources/1");
        assert_eq!(cache.key_for(&descriptor), "custom|/resources/1");
    }

    #[tokio::test]
    async fn test_connect_with_injected_store_skips_redis() {
        let cache = OutputCacheBuilder::new(OutputCacheConfig::default())
            .store(Arc::new(InMemoryCache::default()))
            .connect()
            .await
            .unwrap();

        assert!(cache.store().health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_register_fails_when_store_unreachable() {
        let mut config = OutputCacheConfig::default();
        config.store.port = 1;
        config.store.connection_timeout = Duration::from_millis(500);

        let result = register(config).await;
        assert!(matches!(result, Err(CacheError::Registration { .. })));
    }
}
