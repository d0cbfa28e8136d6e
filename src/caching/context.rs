//! # Request Descriptor and Per-Request Cache Context
//!
//! [`RequestDescriptor`] is the cache's view of an incoming request: the parts a
//! cache key may be derived from. [`OutputCacheContext`] is the typed state the
//! interceptor hands to the capture for the same request, and that handlers can
//! read from the request extensions.

use axum::http::header::CACHE_CONTROL;
use axum::http::{request::Parts, HeaderMap, Request};

use super::entry::CachedResponse;

/// The cacheable unit of work identified by an incoming request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    method: String,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
}

impl RequestDescriptor {
    /// Describe a request by method and path. The method is lower-cased.
    pub fn new(method: impl AsRef<str>, path: impl Into<String>) -> Self {
        Self {
            method: method.as_ref().to_lowercase(),
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
        }
    }

    /// Attach the raw query string
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Attach request headers
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Describe an HTTP request
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().as_str().to_lowercase(),
            path: request.uri().path().to_string(),
            query: request.uri().query().map(str::to_string),
            headers: request.headers().clone(),
        }
    }

    /// Describe a request from its head
    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            method: parts.method.as_str().to_lowercase(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers.clone(),
        }
    }

    /// Lower-cased HTTP method
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value by name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }
}

/// Per-request cache state shared between the two hooks.
///
/// `is_stale == true` means no valid cached value was found: the handler runs
/// and its response may be persisted under `key`. A context only ever belongs
/// to one request.
#[derive(Debug, Clone)]
pub struct OutputCacheContext {
    key: String,

    /// No valid cached value was found for this request
    pub is_stale: bool,

    /// The cached response on a hit
    pub data: Option<CachedResponse>,

    /// The store failed during lookup; the request is being served uncached
    pub lookup_failed: bool,
}

impl OutputCacheContext {
    /// Context for a request whose key had a stored entry
    pub fn hit(key: String, data: CachedResponse) -> Self {
        Self {
            key,
            is_stale: false,
            data: Some(data),
            lookup_failed: false,
        }
    }

    /// Context for a request with nothing valid stored under its key
    pub fn miss(key: String) -> Self {
        Self {
            key,
            is_stale: true,
            data: None,
            lookup_failed: false,
        }
    }

    /// Context for a request whose lookup could not reach the store
    pub fn lookup_failed(key: String) -> Self {
        Self {
            key,
            is_stale: true,
            data: None,
            lookup_failed: true,
        }
    }

    /// Key computed at interception; the capture writes under this exact key
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Whether any `Cache-Control` header carries one of `directives`.
///
/// Directives are compared by name, case-insensitively; arguments such as
/// `private="set-cookie"` or `max-age=0` are ignored.
pub fn has_cache_directive(headers: &HeaderMap, directives: &[&str]) -> bool {
    headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|directive| directive.split('=').next().unwrap_or_default().trim())
        .any(|name| directives.iter().any(|wanted| name.eq_ignore_ascii_case(wanted)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Method;

    #[test]
    fn test_descriptor_lowercases_method() {
        let descriptor = RequestDescriptor::new("GET", "/resources/1");
        assert_eq!(descriptor.method(), "get");
        assert_eq!(descriptor.path(), "/resources/1");
        assert_eq!(descriptor.query(), None);
    }

    #[test]
    fn test_descriptor_from_request() {
        let request = Request::builder()
            .method(Method::GET)
            .uri("/resources/1?expand=owner")
            .header("accept", "application/json")
            .body(Body::empty())
            .unwrap();

        let descriptor = RequestDescriptor::from_request(&request);
        assert_eq!(descriptor.method(), "get");
        assert_eq!(descriptor.path(), "/resources/1");
        assert_eq!(descriptor.query(), Some("expand=owner"));
        assert_eq!(descriptor.header("accept"), Some("application/json"));

        let (parts, _) = request.into_parts();
        assert_eq!(RequestDescriptor::from_parts(&parts), descriptor);
    }

    #[test]
    fn test_context_states() {
        let miss = OutputCacheContext::miss("get|/a".to_string());
        assert!(miss.is_stale);
        assert!(miss.data.is_none());
        assert!(!miss.lookup_failed);
        assert_eq!(miss.key(), "get|/a");

        let failed = OutputCacheContext::lookup_failed("get|/a".to_string());
        assert!(failed.is_stale);
        assert!(failed.lookup_failed);

        let hit = OutputCacheContext::hit(
            "get|/a".to_string(),
            CachedResponse::new(200, Vec::new(), b"body".to_vec()),
        );
        assert!(!hit.is_stale);
        assert_eq!(hit.data.unwrap().body, b"body".to_vec());
    }

    #[test]
    fn test_cache_directive_matching() {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, "public, max-age=60, x-private-ext".parse().unwrap());
        assert!(!has_cache_directive(&headers, &["private", "no-store"]));

        headers.insert(CACHE_CONTROL, "max-age=0, Private=\"set-cookie\"".parse().unwrap());
        assert!(has_cache_directive(&headers, &["private"]));

        headers.append(CACHE_CONTROL, "no-store".parse().unwrap());
        assert!(has_cache_directive(&headers, &["no-store"]));

        assert!(!has_cache_directive(&HeaderMap::new(), &["no-cache"]));
    }
}
