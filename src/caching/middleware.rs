//! # Cache Middleware
//!
//! Tower layer that runs the output cache around an inner service. Per request
//! it calls the interception hook, then either answers from the cache or calls
//! the inner service and passes its response through the capture hook.
//!
//! The request's [`OutputCacheContext`] is inserted into the request extensions
//! before the handler runs, so handlers can read it with
//! `Extension<OutputCacheContext>`.
//!
//! If the request future is dropped before the handler finishes, the capture
//! never runs and nothing is written.

use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::header::{AGE, CACHE_CONTROL};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use futures::StreamExt;
use tower::{Layer, Service};
use tracing::{debug, error};

use super::capture::{declared_content_length, CapturedResponse, SkipReason};
use super::context::{OutputCacheContext, RequestDescriptor};
use super::entry::CachedResponse;
use super::interceptor::InterceptDecision;
use super::output_cache::OutputCache;

/// Header reporting whether the response came from the cache
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Output cache middleware layer
#[derive(Clone)]
pub struct OutputCacheLayer {
    cache: OutputCache,
}

impl OutputCacheLayer {
    pub fn new(cache: OutputCache) -> Self {
        Self { cache }
    }

    /// The cache this layer drives (for admin access)
    pub fn cache(&self) -> &OutputCache {
        &self.cache
    }
}

impl<S> Layer<S> for OutputCacheLayer {
    type Service = OutputCacheService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OutputCacheService {
            inner,
            cache: self.cache.clone(),
        }
    }
}

/// Output cache middleware service
#[derive(Clone)]
pub struct OutputCacheService<S> {
    inner: S,
    cache: OutputCache,
}

impl<S> Service<Request> for OutputCacheService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        // Use the instance that was polled ready and leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let cache = self.cache.clone();

        Box::pin(async move {
            let descriptor = RequestDescriptor::from_request(&request);
            let interception = cache.on_request(&descriptor).await;

            let context = match interception.decision {
                InterceptDecision::Respond(entry) => return Ok(cache.hit_response(entry)),
                InterceptDecision::Unavailable(err) => return Ok(err.into_response()),
                InterceptDecision::ProceedToHandler => interception.context,
            };

            let Some(context) = context else {
                // Not cacheable
                return inner.call(request).await;
            };

            request.extensions_mut().insert(context.clone());
            let response = inner.call(request).await?;

            Ok(cache.capture_response(&context, response).await)
        })
    }
}

impl OutputCache {
    /// Response for a cache hit
    fn hit_response(&self, entry: CachedResponse) -> Response {
        let age = entry.age_secs();
        let mut response = entry.into_response();

        if self.config.emit_cache_headers {
            let headers = response.headers_mut();
            headers.insert(X_CACHE, HeaderValue::from_static("HIT"));
            headers.insert(AGE, HeaderValue::from(age));
            self.insert_default_cache_control(headers);
        }

        response
    }

    /// Buffer a handler response, run the capture hook on it and rebuild it
    async fn capture_response(&self, context: &OutputCacheContext, response: Response) -> Response {
        let (mut parts, body) = response.into_parts();

        // Bodies that could never be stored stream through unbuffered
        let status = parts.status.as_u16();
        if !self.config.is_cacheable_status(status) {
            self.skip(context, SkipReason::Status(status));
            return Response::from_parts(parts, body);
        }

        let limit = self.config.max_response_size;
        if let Some(len) = declared_content_length(&parts.headers).filter(|len| *len > limit) {
            self.skip(context, SkipReason::TooLarge(len));
            return Response::from_parts(parts, body);
        }

        let bytes = match buffer_body(body, limit).await {
            Ok(BufferedBody::Complete(bytes)) => bytes,
            Ok(BufferedBody::Overflow { body, read }) => {
                self.skip(context, SkipReason::TooLarge(read));
                return Response::from_parts(parts, body);
            }
            Err(e) => {
                error!(key = context.key(), error = %e, "Failed to read response body");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let outcome = self
            .on_response(
                context,
                CapturedResponse {
                    status: parts.status,
                    headers: &parts.headers,
                    body: &bytes,
                },
            )
            .await;
        debug!(key = context.key(), outcome = ?outcome, "Response captured");

        if self.config.emit_cache_headers {
            parts.headers.insert(X_CACHE, HeaderValue::from_static("MISS"));
            self.insert_default_cache_control(&mut parts.headers);
        }

        Response::from_parts(parts, Body::from(bytes))
    }

    /// Add cache-control header if not present
    fn insert_default_cache_control(&self, headers: &mut HeaderMap) {
        if headers.contains_key(CACHE_CONTROL) {
            return;
        }

        if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", self.config.ttl)) {
            headers.insert(CACHE_CONTROL, value);
        }
    }
}

/// Result of reading a body up to a size limit
enum BufferedBody {
    /// The whole body, no larger than the limit
    Complete(Bytes),

    /// The limit was exceeded; `body` replays what was read followed by the rest
    Overflow { body: Body, read: usize },
}

/// Read `body` into memory, giving up once more than `limit` bytes arrived
async fn buffer_body(body: Body, limit: usize) -> Result<BufferedBody, axum::Error> {
    let mut stream = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut read = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        read += chunk.len();
        chunks.push(chunk);

        if read > limit {
            let replay = futures::stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
            return Ok(BufferedBody::Overflow {
                body: Body::from_stream(replay.chain(stream)),
                read,
            });
        }
    }

    let mut buffer = Vec::with_capacity(read);
    for chunk in chunks {
        buffer.extend_from_slice(&chunk);
    }

    Ok(BufferedBody::Complete(Bytes::from(buffer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::stores::{CacheStore, InMemoryCache};
    use crate::core::config::{LookupFailurePolicy, OutputCacheConfig};
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    // Mock handler for testing
    #[derive(Clone)]
    struct MockService {
        calls: Arc<AtomicUsize>,
        response_status: StatusCode,
    }

    impl Service<Request> for MockService {
        type Response = Response;
        type Error = Infallible;
        type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, request: Request) -> Self::Future {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let status = self.response_status;
            let stale = request
                .extensions()
                .get::<OutputCacheContext>()
                .map(|context| context.is_stale);

            Box::pin(async move {
                Ok(Response::builder()
                    .status(status)
                    .header("x-saw-stale", format!("{:?}", stale))
                    .body(Body::from("test response"))
                    .unwrap())
            })
        }
    }

    fn setup(
        config: OutputCacheConfig,
        status: StatusCode,
    ) -> (OutputCacheService<MockService>, Arc<InMemoryCache>, Arc<AtomicUsize>) {
        let store = Arc::new(InMemoryCache::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = OutputCache::builder(config)
            .store(store.clone())
            .build()
            .unwrap();

        let service = cache.layer().layer(MockService {
            calls: calls.clone(),
            response_status: status,
        });

        (service, store, calls)
    }

    fn get(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let (service, store, calls) = setup(OutputCacheConfig::default(), StatusCode::OK);

        let response = service.clone().oneshot(get("/resources/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(X_CACHE).unwrap(), "MISS");
        assert_eq!(response.headers().get("x-saw-stale").unwrap(), "Some(true)");
        assert_eq!(response.headers().get(CACHE_CONTROL).unwrap(), "public, max-age=60");
        assert!(store.fetch("get|/resources/1").await.unwrap().is_some());

        let response = service.oneshot(get("/resources/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(X_CACHE).unwrap(), "HIT");
        assert!(response.headers().contains_key(AGE));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"test response");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_response_is_forwarded_not_cached() {
        let (service, store, calls) = setup(OutputCacheConfig::default(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = service.clone().oneshot(get("/resources/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(X_CACHE).is_none());

        let response = service.oneshot(get("/resources/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(store.fetch("get|/resources/1").await.unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_cacheable_method_passes_through() {
        let (service, store, calls) = setup(OutputCacheConfig::default(), StatusCode::OK);

        let request = Request::builder()
            .method("POST")
            .uri("/resources")
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(X_CACHE).is_none());
        assert_eq!(response.headers().get("x-saw-stale").unwrap(), "None");
        assert!(store.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_store_outage_falls_through_to_handler() {
        let (service, store, calls) = setup(OutputCacheConfig::default(), StatusCode::OK);
        store.set_unavailable(true);

        let response = service.oneshot(get("/resources/1")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_store_outage_with_fail_policy_returns_503() {
        let config = OutputCacheConfig {
            lookup_failure_policy: LookupFailurePolicy::Fail,
            ..Default::default()
        };
        let (service, store, calls) = setup(config, StatusCode::OK);
        store.set_unavailable(true);

        let response = service.oneshot(get("/resources/1")).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_headers_can_be_disabled() {
        let config = OutputCacheConfig {
            emit_cache_headers: false,
            ..Default::default()
        };
        let (service, _store, _calls) = setup(config, StatusCode::OK);

        let response = service.oneshot(get("/resources/1")).await.unwrap();
        assert!(response.headers().get(X_CACHE).is_none());
        assert!(response.headers().get(CACHE_CONTROL).is_none());
    }

    fn small_limit_cache(store: Arc<InMemoryCache>) -> OutputCache {
        let config = OutputCacheConfig {
            max_response_size: 4,
            ..Default::default()
        };
        OutputCache::builder(config).store(store).build().unwrap()
    }

    #[tokio::test]
    async fn test_declared_length_over_limit_is_forwarded_not_cached() {
        let store = Arc::new(InMemoryCache::default());
        let cache = small_limit_cache(store.clone());
        let handler = tower::service_fn(|_request: Request| async {
            Ok::<_, Infallible>(
                Response::builder()
                    .status(StatusCode::OK)
                    .header("content-length", "10")
                    .body(Body::from("0123456789"))
                    .unwrap(),
            )
        });
        let service = cache.layer().layer(handler);

        for _ in 0..2 {
            let response = service.clone().oneshot(get("/resources/1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(X_CACHE).is_none());
            let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&body[..], b"0123456789");
        }

        assert_eq!(store.fetch("get|/resources/1").await.unwrap(), None);
        assert_eq!(store.write_count(), 0);
        assert_eq!(cache.stats().skipped_writes, 2);
    }

    #[tokio::test]
    async fn test_streamed_body_over_limit_is_forwarded_not_cached() {
        let store = Arc::new(InMemoryCache::default());
        let cache = small_limit_cache(store.clone());
        let handler = tower::service_fn(|_request: Request| async {
            let chunks = vec!["012", "345", "6789"]
                .into_iter()
                .map(|chunk| Ok::<_, Infallible>(Bytes::from_static(chunk.as_bytes())));
            Ok::<_, Infallible>(Response::new(Body::from_stream(futures::stream::iter(chunks))))
        });
        let service = cache.layer().layer(handler);

        let response = service.oneshot(get("/resources/1")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(X_CACHE).is_none());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"0123456789");
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_streamed_body_within_limit_is_cached() {
        let store = Arc::new(InMemoryCache::default());
        let cache = small_limit_cache(store.clone());
        let handler = tower::service_fn(|_request: Request| async {
            let chunks = vec!["ab", "cd"]
                .into_iter()
                .map(|chunk| Ok::<_, Infallible>(Bytes::from_static(chunk.as_bytes())));
            Ok::<_, Infallible>(Response::new(Body::from_stream(futures::stream::iter(chunks))))
        });
        let service = cache.layer().layer(handler);

        let response = service.oneshot(get("/resources/1")).await.unwrap();

        assert_eq!(response.headers().get(X_CACHE).unwrap(), "MISS");
        let stored = store.fetch("get|/resources/1").await.unwrap().unwrap();
        assert_eq!(CachedResponse::decode(&stored).unwrap().body, b"abcd".to_vec());
    }
}
