//! # Response Capture
//!
//! Second hook, run once per request after the handler produced a response and
//! before it is sent. A response is written to the store only when the request
//! was stale at interception and the response is successful. Writes are best
//! effort: a failed write is logged and counted, and the response is sent
//! regardless.

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderMap, StatusCode};
use tracing::{debug, warn};

use super::context::{has_cache_directive, OutputCacheContext};
use super::entry::CachedResponse;
use super::output_cache::OutputCache;
use super::stats::CacheStats;
use super::stores::CacheStore;
use crate::core::config::WriteMode;

/// The handler's response as seen by the capture hook
#[derive(Debug, Clone, Copy)]
pub struct CapturedResponse<'a> {
    pub status: StatusCode,
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
}

/// Why a stale response was not written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Status is not in the configured success set
    Status(u16),

    /// Body is larger than `max_response_size`
    TooLarge(usize),

    /// The body is shorter than its `Content-Length`
    Truncated(usize),

    /// The response says `Cache-Control: no-store` or `private`
    NotStorable,
}

/// What the capture hook did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The request was served from the cache; nothing to write
    NotStale,

    /// The response was not eligible for storage
    Skipped(SkipReason),

    /// The response was written under the request's key
    Stored,

    /// The write was attempted and failed; the response is unaffected
    WriteFailed,

    /// The response could not be encoded; the response is unaffected
    SerializationFailed,

    /// The write was handed to a background task
    WriteDetached,
}

impl OutputCache {
    /// Response-interception hook.
    ///
    /// With [`WriteMode::Inline`] this returns only after the write settled,
    /// successfully or not. Never fails.
    pub async fn on_response(
        &self,
        context: &OutputCacheContext,
        response: CapturedResponse<'_>,
    ) -> CaptureOutcome {
        // A hit must not rewrite its own entry and reset the TTL
        if !context.is_stale {
            return CaptureOutcome::NotStale;
        }

        if let Some(reason) = self.skip_reason(&response) {
            return self.skip(context, reason);
        }

        let entry = CachedResponse::from_response_parts(response.status, response.headers, response.body);
        let payload = match entry.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = context.key(), error = %e, "Failed to serialize response for caching");
                self.stats.record_write_failure();
                return CaptureOutcome::SerializationFailed;
            }
        };

        let store = Arc::clone(&self.store);
        let stats = Arc::clone(&self.stats);
        let key = context.key().to_string();
        let ttl = self.config.ttl_duration();

        match self.config.write_mode {
            WriteMode::Inline => write_entry(store, stats, key, payload, ttl).await,
            WriteMode::Detached => {
                tokio::spawn(write_entry(store, stats, key, payload, ttl));
                CaptureOutcome::WriteDetached
            }
        }
    }

    /// Record a stale response that will not be written
    pub(crate) fn skip(&self, context: &OutputCacheContext, reason: SkipReason) -> CaptureOutcome {
        debug!(key = context.key(), reason = ?reason, "Not caching response");
        self.stats.record_skipped_write();
        CaptureOutcome::Skipped(reason)
    }

    /// Check whether a response may be stored
    fn skip_reason(&self, response: &CapturedResponse<'_>) -> Option<SkipReason> {
        let status = response.status.as_u16();
        if !self.config.is_cacheable_status(status) {
            return Some(SkipReason::Status(status));
        }

        let declared_len = declared_content_length(response.headers).unwrap_or(0);
        let len = response.body.len().max(declared_len);
        if len > self.config.max_response_size {
            return Some(SkipReason::TooLarge(len));
        }

        // A body shorter than its declared length is truncated
        if declared_len > response.body.len() {
            return Some(SkipReason::Truncated(response.body.len()));
        }

        if has_cache_directive(response.headers, &["no-store", "private"]) {
            return Some(SkipReason::NotStorable);
        }

        None
    }
}

/// `Content-Length` of a response, if present and well formed
pub(crate) fn declared_content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<usize>().ok())
}

async fn write_entry(
    store: Arc<dyn CacheStore>,
    stats: Arc<CacheStats>,
    key: String,
    payload: Vec<u8>,
    ttl: Duration,
) -> CaptureOutcome {
    match store.store(&key, &payload, ttl).await {
        Ok(()) => {
            debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached response");
            stats.record_write();
            CaptureOutcome::Stored
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to write response to cache");
            stats.record_write_failure();
            CaptureOutcome::WriteFailed
        }
    }
}
