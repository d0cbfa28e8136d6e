//! # Cache Admin Interface
//!
//! Admin endpoints for inspecting the output cache and evicting single entries.

use axum::{
    extract::{Query, State},
    response::Json,
    routing::{delete, get},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::context::RequestDescriptor;
use super::output_cache::OutputCache;
use super::stats::CacheStatsSnapshot;
use crate::core::error::CacheError;

/// Cache admin router
pub struct CacheAdminRouter;

impl CacheAdminRouter {
    /// Create cache admin router
    pub fn create_router(cache: OutputCache) -> Router {
        Router::new()
            .route("/cache/stats", get(get_cache_stats))
            .route("/cache/health", get(get_cache_health))
            .route("/cache/entries", delete(delete_cache_entry))
            .with_state(cache)
    }
}

/// Cache statistics response
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub stats: CacheStatsSnapshot,
    pub ttl_seconds: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Cache health response
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheHealthResponse {
    pub healthy: bool,
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Identifies the entry to evict, the same way a request would
#[derive(Debug, Deserialize)]
pub struct CacheEntryParams {
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    pub query: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Cache eviction response
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEvictionResponse {
    pub key: String,
    pub removed: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Get cache statistics
pub async fn get_cache_stats(State(cache): State<OutputCache>) -> Json<CacheStatsResponse> {
    let stats = cache.stats();

    info!(
        hits = stats.hits,
        misses = stats.misses,
        hit_ratio = stats.hit_ratio,
        "Cache stats requested"
    );

    Json(CacheStatsResponse {
        stats,
        ttl_seconds: cache.config().ttl,
        timestamp: chrono::Utc::now(),
    })
}

/// Get cache health status
pub async fn get_cache_health(State(cache): State<OutputCache>) -> Json<CacheHealthResponse> {
    let (healthy, error) = match cache.store().health_check().await {
        Ok(healthy) => (healthy, None),
        Err(e) => {
            warn!(error = %e, "Cache store health check failed");
            (false, Some(e.to_string()))
        }
    };

    Json(CacheHealthResponse {
        healthy,
        error,
        timestamp: chrono::Utc::now(),
    })
}

/// Evict the entry a request would be served from
pub async fn delete_cache_entry(
    State(cache): State<OutputCache>,
    Query(params): Query<CacheEntryParams>,
) -> Result<Json<CacheEvictionResponse>, CacheError> {
    let mut descriptor = RequestDescriptor::new(&params.method, params.path);
    if let Some(query) = params.query {
        descriptor = descriptor.with_query(query);
    }

    let key = cache.key_for(&descriptor);
    let removed = cache.store().remove(&key).await?;

    info!(key = %key, removed, "Cache entry evicted via admin API");

    Ok(Json(CacheEvictionResponse {
        key,
        removed,
        timestamp: chrono::Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::entry::CachedResponse;
    use crate::caching::stores::{CacheStore, InMemoryCache};
    use crate::core::config::OutputCacheConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn create_test_cache() -> (OutputCache, Arc<InMemoryCache>) {
        let store = Arc::new(InMemoryCache::default());
        let cache = OutputCache::builder(OutputCacheConfig::default())
            .store(store.clone())
            .build()
            .unwrap();
        (cache, store)
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_cache_stats_endpoint() {
        let (cache, _store) = create_test_cache();
        let app = CacheAdminRouter::create_router(cache);

        let response = app
            .oneshot(Request::get("/cache/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stats: CacheStatsResponse = json_body(response).await;
        assert_eq!(stats.stats.hits, 0);
        assert_eq!(stats.ttl_seconds, 60);
    }

    #[tokio::test]
    async fn test_cache_health_endpoint() {
        let (cache, store) = create_test_cache();
        let app = CacheAdminRouter::create_router(cache);

        let response = app
            .clone()
            .oneshot(Request::get("/cache/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let health: CacheHealthResponse = json_body(response).await;
        assert!(health.healthy);

        store.set_unavailable(true);
        let response = app
            .oneshot(Request::get("/cache/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let health: CacheHealthResponse = json_body(response).await;
        assert!(!health.healthy);
        assert!(health.error.is_some());
    }

    #[tokio::test]
    async fn test_delete_cache_entry() {
        let (cache, store) = create_test_cache();
        let entry = CachedResponse::new(200, Vec::new(), b"V".to_vec());
        store
            .store("get|/resources/1", &entry.encode().unwrap(), Duration::from_secs(60))
            .await
            .unwrap();
        let app = CacheAdminRouter::create_router(cache);

        let request = Request::delete("/cache/entries?path=/resources/1")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let eviction: CacheEvictionResponse = json_body(response).await;
        assert_eq!(eviction.key, "get|/resources/1");
        assert!(eviction.removed);
        assert_eq!(store.fetch("get|/resources/1").await.unwrap(), None);

        let request = Request::delete("/cache/entries?path=/resources/1")
            .body(Body::empty())
            .unwrap();
        let eviction: CacheEvictionResponse = json_body(app.oneshot(request).await.unwrap()).await;
        assert!(!eviction.removed);
    }

    #[tokio::test]
    async fn test_delete_cache_entry_store_down() {
        let (cache, store) = create_test_cache();
        store.set_unavailable(true);
        let app = CacheAdminRouter::create_router(cache);

        let request = Request::delete("/cache/entries?path=/resources/1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
