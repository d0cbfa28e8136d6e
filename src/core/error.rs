//! # Error Handling Module
//!
//! Error types for the output cache, built with `thiserror`.
//!
//! The taxonomy mirrors how the cache degrades:
//! - a cache miss is not an error at all (`Ok(None)` from a store lookup)
//! - store connectivity failures and timeouts are recoverable, the request is
//!   served as if uncached
//! - serialization failures skip the write, the response still reaches the client
//! - registration and configuration failures are fatal and surface at startup
//!
//! Nothing in this module is ever thrown across a hook boundary. The
//! interceptor and capture turn every `CacheError` into a logged, counted
//! outcome and only the `fail` lookup policy turns one into a response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Result type used by every store and cache operation
pub type CacheResult<T> = Result<T, CacheError>;

/// Error types for cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// The store is unreachable or answered with a protocol-level failure
    #[error("Cache store connectivity error: {0}")]
    Connectivity(#[from] redis::RedisError),

    /// A store operation did not complete within the configured bound
    #[error("Cache store operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A response could not be encoded for storage, or a stored entry could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store connection could not be established at startup
    #[error("Registration failed: {message}")]
    Registration { message: String },

    /// Invalid configuration
    #[error("Cache configuration error: {message}")]
    Configuration { message: String },

    /// Any other backend failure
    #[error("Cache store error: {message}")]
    Store { message: String },
}

impl CacheError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a registration error with a custom message
    pub fn registration<S: Into<String>>(message: S) -> Self {
        Self::Registration {
            message: message.into(),
        }
    }

    /// Create a generic store error with a custom message
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Timeout error from a duration bound
    pub fn timeout(bound: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: bound.as_millis() as u64,
        }
    }

    /// Whether this error means the store itself could not be reached.
    ///
    /// These are the failures that must never be mistaken for a cache miss.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Timeout { .. } | Self::Store { .. })
    }

    /// Get the HTTP status code used when this error has to be surfaced to a client
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Connectivity(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Registration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Connectivity(_) => "store_connectivity_error",
            Self::Timeout { .. } => "store_timeout",
            Self::Serialization(_) => "serialization_error",
            Self::Registration { .. } => "registration_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Store { .. } => "store_error",
        }
    }
}

/// Lets axum turn a surfaced cache error straight into a JSON response.
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}
