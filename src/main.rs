//! # Output Cache Demo
//!
//! Serves a small `/resources/:id` API behind the output cache, plus the cache
//! admin endpoints. Configuration is read from the YAML file named by
//! `OUTPUT_CACHE_CONFIG` (defaults apply when unset), then `OUTPUT_CACHE_*`
//! environment overrides.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Extension, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use output_cache::caching::{CacheAdminRouter, RequestDescriptor};
use output_cache::observability::init_logging;
use output_cache::{OutputCache, OutputCacheConfig, OutputCacheContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().await?;
    init_logging(&config.logging)?;

    info!("Starting output cache demo");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let cache = OutputCache::builder(config)
        .on_cache_miss(|descriptor: &RequestDescriptor| {
            info!(method = descriptor.method(), path = descriptor.path(), "Cache miss");
        })
        .connect()
        .await
        .context("Failed to register output cache")?;

    let api = Router::new()
        .route("/resources/:id", get(get_resource))
        .layer(cache.layer());

    let app = Router::new()
        .merge(api)
        .merge(CacheAdminRouter::create_router(cache))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = std::env::var("OUTPUT_CACHE_DEMO_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .context("Invalid OUTPUT_CACHE_DEMO_ADDR")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Output cache demo shutdown complete");
    Ok(())
}

async fn load_config() -> anyhow::Result<OutputCacheConfig> {
    match std::env::var("OUTPUT_CACHE_CONFIG") {
        Ok(path) => OutputCacheConfig::load_from_file(&path)
            .await
            .with_context(|| format!("Failed to load configuration from {}", path)),
        Err(_) => {
            let mut config = OutputCacheConfig::default();
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResourceParams {
    /// Simulated handler latency in milliseconds
    delay_ms: Option<u64>,
    /// Force a failed response
    fail: Option<bool>,
}

async fn get_resource(
    Path(id): Path<String>,
    Query(params): Query<ResourceParams>,
    context: Option<Extension<OutputCacheContext>>,
) -> impl IntoResponse {
    if let Some(delay) = params.delay_ms {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if params.fail.unwrap_or(false) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "resource backend failed" })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "id": id,
            "generated_at": chrono::Utc::now(),
            "lookup_failed": context.map(|Extension(context)| context.lookup_failed),
        })),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
