//! # Cache Stores Module
//!
//! The contract the cache uses to reach its key-value store, and its two
//! implementations: Redis for real deployments and an in-memory store for tests
//! and local development.

pub mod memory;
pub mod redis_store;

pub use memory::{InMemoryCache, InMemoryCacheConfig};
pub use redis_store::{RedisCache, RedisCacheConfig};

use crate::core::error::CacheResult;
use async_trait::async_trait;
use std::time::Duration;

/// Trait for cache store implementations
///
/// Implementations must be safe to call from many overlapping requests at once.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value from the store.
    ///
    /// A missing or expired key is `Ok(None)`. Failing to reach the store is an
    /// `Err`, never `Ok(None)`.
    async fn fetch(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store a value with TTL
    async fn store(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Delete a value, returning whether it existed. Not used when serving requests.
    async fn remove(&self, key: &str) -> CacheResult<bool>;

    /// Perform health check
    async fn health_check(&self) -> CacheResult<bool>;
}
