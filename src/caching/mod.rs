//! # Output Caching Module
//!
//! Response caching for axum services backed by a shared key-value store
//! (Redis in production, an in-memory store for tests and local runs).
//!
//! ## Features
//! - Per-request key derivation (`method|path` by default, pluggable)
//! - Request interception: serve from cache or hand over to the route handler
//! - Response capture: store successful responses under the request's key with a TTL
//! - Store outages degrade to "serve uncached", never to a failed request
//! - Cache-miss observer for metrics or warm-up
//! - Admin endpoints for stats, health and single-entry eviction
//!
//! ## Architecture
//! 1. **Key Generator**: derives the cache key from a [`RequestDescriptor`]
//! 2. **Stores**: the [`CacheStore`] seam with Redis and in-memory implementations
//! 3. **Interceptor**: the request hook ([`OutputCache::on_request`])
//! 4. **Capture**: the response hook ([`OutputCache::on_response`])
//! 5. **Middleware**: the tower layer driving both hooks around a service
//! 6. **Registration**: config validation and store connection at startup
//!
//! ## Usage Example
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use output_cache::caching::register;
//! use output_cache::core::config::OutputCacheConfig;
//!
//! # async fn run() -> output_cache::core::error::CacheResult<()> {
//! let layer = register(OutputCacheConfig::default()).await?;
//!
//! let app: Router = Router::new()
//!     .route("/resources/:id", get(|| async { "resource" }))
//!     .layer(layer);
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod capture;
pub mod context;
pub mod entry;
pub mod interceptor;
pub mod key_generator;
pub mod middleware;
pub mod output_cache;
pub mod registration;
pub mod stats;
pub mod stores;

pub use admin::CacheAdminRouter;
pub use capture::{CaptureOutcome, CapturedResponse, SkipReason};
pub use context::{OutputCacheContext, RequestDescriptor};
pub use entry::CachedResponse;
pub use interceptor::{CacheMissObserver, InterceptDecision, Interception};
pub use key_generator::{CustomKeyGenerator, DefaultKeyGenerator, KeyGenerationStrategy, KeyGenerator};
pub use middleware::{OutputCacheLayer, OutputCacheService, X_CACHE};
pub use output_cache::OutputCache;
pub use registration::{register, OutputCacheBuilder};
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use stores::{CacheStore, InMemoryCache, InMemoryCacheConfig, RedisCache, RedisCacheConfig};
