//! # Request Interception
//!
//! First hook, run once per request before the route handler. It decides
//! between three outcomes:
//!
//! - **bypass**: the request is not cacheable; the store is never consulted
//! - **hit**: a valid entry exists; the handler is skipped and the entry is sent
//! - **miss**: nothing valid is stored; the handler runs and the cache-miss
//!   observer is notified
//!
//! A store failure during lookup is neither a hit nor a miss. What it does is
//! decided by [`LookupFailurePolicy`].

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, warn};

use super::context::{has_cache_directive, OutputCacheContext, RequestDescriptor};
use super::entry::CachedResponse;
use super::output_cache::OutputCache;
use crate::core::config::LookupFailurePolicy;
use crate::core::error::CacheError;

/// Notified when a cacheable request finds nothing valid in the store.
///
/// Runs on Tokio's blocking pool, detached from the request: the hook returns
/// without waiting for it, so the observer may block or do I/O. A panicking
/// observer is logged and ignored.
pub trait CacheMissObserver: Send + Sync + 'static {
    fn on_cache_miss(&self, descriptor: &RequestDescriptor);
}

impl<F> CacheMissObserver for F
where
    F: Fn(&RequestDescriptor) + Send + Sync + 'static,
{
    fn on_cache_miss(&self, descriptor: &RequestDescriptor) {
        self(descriptor)
    }
}

/// What the host should do with the request
#[derive(Debug)]
pub enum InterceptDecision {
    /// Run the route handler
    ProceedToHandler,

    /// Skip the handler and send this cached response
    Respond(CachedResponse),

    /// Skip the handler and answer 503; only under [`LookupFailurePolicy::Fail`]
    Unavailable(CacheError),
}

/// Result of the request-interception hook
#[derive(Debug)]
pub struct Interception {
    /// Per-request state for the capture hook; `None` for bypassed requests
    pub context: Option<OutputCacheContext>,

    pub decision: InterceptDecision,
}

impl Interception {
    fn bypass() -> Self {
        Self {
            context: None,
            decision: InterceptDecision::ProceedToHandler,
        }
    }

    pub fn proceed_to_handler(&self) -> bool {
        matches!(self.decision, InterceptDecision::ProceedToHandler)
    }

    /// The cached response to send instead of running the handler
    pub fn response_to_send(&self) -> Option<&CachedResponse> {
        match &self.decision {
            InterceptDecision::Respond(entry) => Some(entry),
            _ => None,
        }
    }
}

impl OutputCache {
    /// Request-interception hook.
    ///
    /// Never fails: store errors are logged and counted, then resolved through
    /// the configured lookup failure policy.
    pub async fn on_request(&self, descriptor: &RequestDescriptor) -> Interception {
        if !self.is_request_cacheable(descriptor) {
            self.stats.record_bypass();
            return Interception::bypass();
        }

        let key = self.key_generator.generate_key(descriptor);

        match self.store.fetch(&key).await {
            Ok(Some(data)) => match CachedResponse::decode(&data) {
                Ok(entry) => {
                    debug!(key = %key, "Cache hit");
                    self.stats.record_hit();
                    Interception {
                        context: Some(OutputCacheContext::hit(key, entry.clone())),
                        decision: InterceptDecision::Respond(entry),
                    }
                }
                Err(e) => {
                    // An undecodable entry is never served
                    warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                    self.miss(key, descriptor)
                }
            },
            Ok(None) => self.miss(key, descriptor),
            Err(e) => {
                self.stats.record_lookup_error();
                warn!(
                    key = %key,
                    error = %e,
                    policy = ?self.config.lookup_failure_policy,
                    "Cache lookup failed"
                );

                match self.config.lookup_failure_policy {
                    LookupFailurePolicy::FallThrough => Interception {
                        context: Some(OutputCacheContext::lookup_failed(key)),
                        decision: InterceptDecision::ProceedToHandler,
                    },
                    LookupFailurePolicy::Fail => Interception {
                        context: Some(OutputCacheContext::lookup_failed(key)),
                        decision: InterceptDecision::Unavailable(e),
                    },
                }
            }
        }
    }

    fn miss(&self, key: String, descriptor: &RequestDescriptor) -> Interception {
        debug!(key = %key, "Cache miss");
        self.stats.record_miss();
        self.notify_miss(descriptor);

        Interception {
            context: Some(OutputCacheContext::miss(key)),
            decision: InterceptDecision::ProceedToHandler,
        }
    }

    /// Hand the descriptor to the observer on the blocking pool; the request never waits for it
    fn notify_miss(&self, descriptor: &RequestDescriptor) {
        let Some(observer) = self.miss_observer.clone() else {
            return;
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            // Outside a runtime there is nowhere to send it
            let outcome = catch_unwind(AssertUnwindSafe(|| observer.on_cache_miss(descriptor)));
            if outcome.is_err() {
                warn!(path = descriptor.path(), "Cache miss observer panicked, ignoring");
            }
            return;
        };

        let descriptor = descriptor.clone();
        let path = descriptor.path().to_string();
        let task = handle.spawn_blocking(move || observer.on_cache_miss(&descriptor));

        handle.spawn(async move {
            if let Err(e) = task.await {
                warn!(path = %path, error = %e, "Cache miss observer failed, ignoring");
            }
        });
    }

    /// Check if request is cacheable
    fn is_request_cacheable(&self, descriptor: &RequestDescriptor) -> bool {
        if !self.config.is_cacheable_method(descriptor.method()) {
            return false;
        }

        if self.config.respect_request_cache_control
            && has_cache_directive(descriptor.headers(), &["no-cache", "no-store"])
        {
            return false;
        }

        true
    }
}
