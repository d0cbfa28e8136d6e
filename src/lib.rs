//! # Output Cache - Core Library Crate
//!
//! Response caching middleware for axum/tower services. A cacheable request is
//! answered from a shared store when a valid entry exists; otherwise the route
//! handler runs and its successful response is stored for the next caller.
//!
//! The two halves of the pipeline are exposed as plain async hooks on
//! [`OutputCache`] ([`on_request`](OutputCache::on_request) and
//! [`on_response`](OutputCache::on_response)) and wired into axum by
//! [`OutputCacheLayer`].

/// Error types and configuration
pub mod core;

/// Key generation, stores, the two hooks and the tower adapter
pub mod caching;

/// Logging setup
pub mod observability;

// Re-export commonly used types for easier access

/// Main error type used throughout the crate
pub use core::error::{CacheError, CacheResult};

/// Configuration structures
pub use core::config::{LookupFailurePolicy, OutputCacheConfig, StoreConfig, WriteMode};

/// Registration entry points and the cache itself
pub use caching::{register, OutputCache, OutputCacheBuilder, OutputCacheContext, OutputCacheLayer};
