//! # In-Memory Cache Store
//!
//! A [`CacheStore`] kept in process memory, with per-entry TTL and a periodic
//! sweep of expired entries. It stands in for Redis in tests and local
//! development, and can simulate a store outage.

use super::CacheStore;
use crate::core::error::{CacheError, CacheResult};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

/// In-memory cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryCacheConfig {
    /// Cleanup interval for expired entries
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory cache implementation
pub struct InMemoryCache {
    /// Cache entries storage
    entries: Arc<DashMap<String, MemoryEntry>>,

    /// Successful writes since creation
    writes: AtomicU64,

    /// When set, every operation fails as if the store were unreachable
    unavailable: AtomicBool,

    /// Cleanup task handle
    cleanup_task: Option<JoinHandle<()>>,
}

impl InMemoryCache {
    /// Create a new in-memory cache.
    ///
    /// The expiry sweep only runs when created inside a Tokio runtime; expired
    /// entries are never returned either way.
    pub fn new(config: InMemoryCacheConfig) -> Self {
        let entries: Arc<DashMap<String, MemoryEntry>> = Arc::new(DashMap::new());

        let cleanup_task = tokio::runtime::Handle::try_current().ok().map(|handle| {
            let entries = Arc::clone(&entries);
            let cleanup_interval = config.cleanup_interval;

            handle.spawn(async move {
                let mut interval = interval(cleanup_interval);
                loop {
                    interval.tick().await;
                    Self::cleanup_expired_entries(&entries);
                }
            })
        });

        Self {
            entries,
            writes: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
            cleanup_task,
        }
    }

    /// Cleanup expired entries
    fn cleanup_expired_entries(entries: &DashMap<String, MemoryEntry>) {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        let cleaned = before.saturating_sub(entries.len());

        if cleaned > 0 {
            debug!("Cleaned up {} expired cache entries", cleaned);
        }
    }

    /// Simulate the store going down (`true`) or coming back (`false`)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful writes
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Remaining TTL of a live entry
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.expires_at.saturating_duration_since(Instant::now()))
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::store("in-memory store marked unavailable"));
        }
        Ok(())
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(InMemoryCacheConfig::default())
    }
}

impl Drop for InMemoryCache {
    fn drop(&mut self) {
        if let Some(task) = self.cleanup_task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn fetch(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.ensure_available()?;

        let value = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };

        if value.is_none() {
            self.entries.remove_if(key, |_, entry| entry.is_expired());
        }

        Ok(value)
    }

    async fn store(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.ensure_available()?;

        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);

        debug!("Set in-memory cache key: {} with TTL: {:?}", key, ttl);
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<bool> {
        self.ensure_available()?;
        Ok(self.entries.remove(key).is_some())
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(!self.unavailable.load(Ordering::SeqCst))
    }
}
