//! # Output Cache
//!
//! [`OutputCache`] ties the pieces together: validated config, the shared store
//! handle, the key generator, the optional cache-miss observer and the stats.
//! Its two hooks live in [`interceptor`](super::interceptor) and
//! [`capture`](super::capture). Cloning is cheap and every clone shares the same
//! store handle and counters.

use std::sync::Arc;

use super::context::RequestDescriptor;
use super::interceptor::CacheMissObserver;
use super::key_generator::KeyGenerator;
use super::middleware::OutputCacheLayer;
use super::registration::OutputCacheBuilder;
use super::stats::{CacheStats, CacheStatsSnapshot};
use super::stores::CacheStore;
use crate::core::config::OutputCacheConfig;

#[derive(Clone)]
pub struct OutputCache {
    pub(crate) config: Arc<OutputCacheConfig>,
    pub(crate) store: Arc<dyn CacheStore>,
    pub(crate) key_generator: Arc<dyn KeyGenerator>,
    pub(crate) miss_observer: Option<Arc<dyn CacheMissObserver>>,
    pub(crate) stats: Arc<CacheStats>,
}

impl OutputCache {
    /// Start configuring an output cache
    pub fn builder(config: OutputCacheConfig) -> OutputCacheBuilder {
        OutputCacheBuilder::new(config)
    }

    pub fn config(&self) -> &OutputCacheConfig {
        &self.config
    }

    /// The shared store handle
    pub fn store(&self) -> Arc<dyn CacheStore> {
        Arc::clone(&self.store)
    }

    /// Key a request would be cached under
    pub fn key_for(&self, descriptor: &RequestDescriptor) -> String {
        self.key_generator.generate_key(descriptor)
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Tower layer that drives both hooks around an inner service
    pub fn layer(&self) -> OutputCacheLayer {
        OutputCacheLayer::new(self.clone())
    }
}

impl std::fmt::Debug for OutputCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputCache")
            .field("config", &self.config)
            .field("has_miss_observer", &self.miss_observer.is_some())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}
