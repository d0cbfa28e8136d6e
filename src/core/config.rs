//! # Configuration Module
//!
//! Configuration for the output cache: store connection parameters, TTL,
//! key strategy, cacheability rules and the degradation policies.
//!
//! ## Key Features
//! - YAML/JSON configuration parsing with serde
//! - Environment variable override support (`OUTPUT_CACHE_*`)
//! - Validation once at registration time, with every problem reported together
//!
//! Options that cannot be serialized (custom key generators, the cache-miss
//! observer, an injected store) are set on
//! [`OutputCacheBuilder`](crate::caching::OutputCacheBuilder) instead.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::caching::key_generator::KeyGenerationStrategy;
use crate::core::error::{CacheError, CacheResult};
use crate::observability::config::LogConfig;

/// Complete output cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputCacheConfig {
    /// Key-value store connection parameters
    pub store: StoreConfig,

    /// Time-to-live of stored responses, in seconds
    pub ttl: u64,

    /// How cache keys are derived from requests
    pub key_strategy: KeyGenerationStrategy,

    /// HTTP methods whose requests are looked up and stored
    pub cacheable_methods: Vec<String>,

    /// Response status codes considered successful enough to store
    pub cacheable_status_codes: Vec<u16>,

    /// Largest response body that will be stored, in bytes
    pub max_response_size: usize,

    /// What a store failure during lookup does to the request
    pub lookup_failure_policy: LookupFailurePolicy,

    /// Whether the capture waits for the store write
    pub write_mode: WriteMode,

    /// Add `X-Cache` and default `Cache-Control` headers to cacheable responses
    pub emit_cache_headers: bool,

    /// Bypass the cache when the client sends `Cache-Control: no-cache` or `no-store`
    pub respect_request_cache_control: bool,

    /// Logging settings for the demo binary and hosts that use `init_logging`
    pub logging: LogConfig,
}

impl OutputCacheConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let content = tokio::fs::read_to_string(path).await
            .map_err(|e| CacheError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: OutputCacheConfig = serde_yaml::from_str(&content)
            .map_err(|e| CacheError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON
    pub async fn load_from_json<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let content = tokio::fs::read_to_string(path).await
            .map_err(|e| CacheError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: OutputCacheConfig = serde_json::from_str(&content)
            .map_err(|e| CacheError::config(format!("Failed to parse JSON config: {}", e)))?;

        config.apply_env_overrides()?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Environment variables follow the pattern: OUTPUT_CACHE_<SECTION>_<FIELD>
    /// For example: OUTPUT_CACHE_STORE_PORT=6380
    pub fn apply_env_overrides(&mut self) -> CacheResult<()> {
        use std::env;

        if let Ok(host) = env::var("OUTPUT_CACHE_STORE_HOST") {
            self.store.host = host;
        }

        if let Ok(port) = env::var("OUTPUT_CACHE_STORE_PORT") {
            self.store.port = port.parse()
                .map_err(|e| CacheError::config(format!("Invalid OUTPUT_CACHE_STORE_PORT: {}", e)))?;
        }

        if let Ok(db) = env::var("OUTPUT_CACHE_STORE_DATABASE") {
            self.store.database = db.parse()
                .map_err(|e| CacheError::config(format!("Invalid OUTPUT_CACHE_STORE_DATABASE: {}", e)))?;
        }

        if let Ok(password) = env::var("OUTPUT_CACHE_STORE_PASSWORD") {
            self.store.password = Some(password);
        }

        if let Ok(timeout) = env::var("OUTPUT_CACHE_STORE_OPERATION_TIMEOUT") {
            self.store.operation_timeout = humantime::parse_duration(&timeout)
                .map_err(|e| CacheError::config(format!("Invalid OUTPUT_CACHE_STORE_OPERATION_TIMEOUT: {}", e)))?;
        }

        if let Ok(ttl) = env::var("OUTPUT_CACHE_TTL") {
            self.ttl = ttl.parse()
                .map_err(|e| CacheError::config(format!("Invalid OUTPUT_CACHE_TTL: {}", e)))?;
        }

        if let Ok(policy) = env::var("OUTPUT_CACHE_LOOKUP_FAILURE_POLICY") {
            self.lookup_failure_policy = policy.parse()
                .map_err(|e| CacheError::config(format!("Invalid OUTPUT_CACHE_LOOKUP_FAILURE_POLICY: {}", e)))?;
        }

        if let Ok(mode) = env::var("OUTPUT_CACHE_WRITE_MODE") {
            self.write_mode = mode.parse()
                .map_err(|e| CacheError::config(format!("Invalid OUTPUT_CACHE_WRITE_MODE: {}", e)))?;
        }

        if let Ok(level) = env::var("OUTPUT_CACHE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = env::var("OUTPUT_CACHE_LOG_FORMAT") {
            self.logging.format = format.parse()
                .map_err(|e| CacheError::config(format!("Invalid OUTPUT_CACHE_LOG_FORMAT: {}", e)))?;
        }

        Ok(())
    }

    /// Validate the configuration, reporting every problem at once
    pub fn validate(&self) -> CacheResult<()> {
        let mut errors = Vec::new();

        if self.store.host.trim().is_empty() {
            errors.push("Store host cannot be empty".to_string());
        }

        if self.store.port == 0 {
            errors.push("Store port must be greater than 0".to_string());
        }

        if self.store.database < 0 {
            errors.push(format!("Store database must not be negative, got: {}", self.store.database));
        }

        if self.store.connection_timeout.is_zero() {
            errors.push("Store connection_timeout must be greater than 0".to_string());
        }

        if self.store.operation_timeout.is_zero() {
            errors.push("Store operation_timeout must be greater than 0".to_string());
        }

        if self.ttl == 0 {
            errors.push("TTL must be a positive number of seconds".to_string());
        }

        if self.cacheable_methods.is_empty() {
            errors.push("At least one cacheable method must be configured".to_string());
        }

        for method in &self.cacheable_methods {
            if axum::http::Method::from_bytes(method.as_bytes()).is_err() {
                errors.push(format!("Invalid cacheable method: {}", method));
            }
        }

        if self.cacheable_status_codes.is_empty() {
            errors.push("At least one cacheable status code must be configured".to_string());
        }

        // Only success statuses may ever populate the cache
        for code in &self.cacheable_status_codes {
            if !(200..300).contains(code) {
                errors.push(format!("Cacheable status code must be 2xx, got: {}", code));
            }
        }

        if self.max_response_size == 0 {
            errors.push("max_response_size must be greater than 0".to_string());
        }

        if let KeyGenerationStrategy::WithHeaders { headers } = &self.key_strategy {
            if headers.is_empty() {
                errors.push("with_headers key strategy needs at least one header".to_string());
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {},
            _ => errors.push(format!("Invalid log level: {}", self.logging.level)),
        }

        if !errors.is_empty() {
            return Err(CacheError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }

    /// TTL as a duration
    pub fn ttl_duration(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }

    /// Whether requests with this method are looked up at all
    pub fn is_cacheable_method(&self, method: &str) -> bool {
        self.cacheable_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Whether a response with this status may be stored
    pub fn is_cacheable_status(&self, status: u16) -> bool {
        self.cacheable_status_codes.contains(&status)
    }
}

impl Default for OutputCacheConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            ttl: 60,
            key_strategy: KeyGenerationStrategy::default(),
            cacheable_methods: vec!["GET".to_string()],
            cacheable_status_codes: vec![200, 203, 204],
            max_response_size: 1024 * 1024, // 1MB
            lookup_failure_policy: LookupFailurePolicy::default(),
            write_mode: WriteMode::default(),
            emit_cache_headers: true,
            respect_request_cache_control: false,
            logging: LogConfig::default(),
        }
    }
}

/// Key-value store connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store host name or address
    pub host: String,

    /// Store port
    pub port: u16,

    /// Redis logical database
    pub database: i64,

    /// Optional password
    pub password: Option<String>,

    /// Prefix prepended to every key on the wire
    pub key_prefix: String,

    /// Bound on establishing the connection at registration
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,

    /// Bound on every individual get/set/delete round trip
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
}

impl StoreConfig {
    /// Connection URL in the form the redis client expects. The password is percent-encoded.
    pub fn redis_url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                urlencoding::encode(password),
                self.host,
                self.port,
                self.database
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: None,
            key_prefix: String::new(),
            connection_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(1),
        }
    }
}

/// What happens to a request when the store fails during lookup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LookupFailurePolicy {
    /// Run the handler as if nothing was cached; the failure is logged and counted
    #[default]
    FallThrough,

    /// Answer with 503 Service Unavailable without running the handler
    Fail,
}

impl FromStr for LookupFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fall_through" | "fallthrough" => Ok(Self::FallThrough),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unknown lookup failure policy: {}", other)),
        }
    }
}

/// How the capture performs the store write
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Await the write (success or failure) before the response continues
    #[default]
    Inline,

    /// Spawn the write and let the response continue immediately
    Detached,
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inline" => Ok(Self::Inline),
            "detached" => Ok(Self::Detached),
            other => Err(format!("unknown write mode: {}", other)),
        }
    }
}
