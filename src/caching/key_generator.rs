//! # Cache Key Generator
//!
//! This module maps a [`RequestDescriptor`] to the key its response is stored
//! under. Key generation is a pure function of the descriptor: identical
//! descriptors always produce identical keys and therefore share cached results.
//!
//! The default key is `"<lowercased-method>|<path>"`, e.g. `get|/resources/1`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::context::RequestDescriptor;

/// Separator between key components
pub const KEY_DELIMITER: char = '|';

/// Key generation strategy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyGenerationStrategy {
    /// `method|path`
    #[default]
    Simple,

    /// `method|path?query`, query omitted when the request has none
    WithQuery,

    /// `method|path` followed by `|name=value` for each listed header present
    WithHeaders { headers: Vec<String> },

    /// `method|<sha256 of path and query>` for bounded key length
    Hashed,
}

/// Cache key generator trait
pub trait KeyGenerator: Send + Sync {
    /// Generate the cache key for a request
    fn generate_key(&self, descriptor: &RequestDescriptor) -> String;
}

/// Default key generator implementation
#[derive(Debug, Clone, Default)]
pub struct DefaultKeyGenerator {
    strategy: KeyGenerationStrategy,
}

impl DefaultKeyGenerator {
    /// Create a new default key generator
    pub fn new(strategy: KeyGenerationStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &KeyGenerationStrategy {
        &self.strategy
    }
}

impl KeyGenerator for DefaultKeyGenerator {
    fn generate_key(&self, descriptor: &RequestDescriptor) -> String {
        let method = descriptor.method();
        let path = descriptor.path();

        match &self.strategy {
            KeyGenerationStrategy::Simple => {
                format!("{}{}{}", method, KEY_DELIMITER, path)
            }

            KeyGenerationStrategy::WithQuery => match descriptor.query() {
                Some(query) => format!("{}{}{}?{}", method, KEY_DELIMITER, path, query),
                None => format!("{}{}{}", method, KEY_DELIMITER, path),
            },

            KeyGenerationStrategy::WithHeaders { headers } => {
                let mut key = format!("{}{}{}", method, KEY_DELIMITER, path);

                for header_name in headers {
                    let header_name = header_name.to_lowercase();
                    if let Some(header_value) = descriptor.header(&header_name) {
                        key.push(KEY_DELIMITER);
                        key.push_str(&format!("{}={}", header_name, header_value));
                    }
                }

                key
            }

            KeyGenerationStrategy::Hashed => {
                let mut hasher = Sha256::new();
                hasher.update(path.as_bytes());

                if let Some(query) = descriptor.query() {
                    hasher.update(b"?");
                    hasher.update(query.as_bytes());
                }

                format!("{}{}{}", method, KEY_DELIMITER, hex::encode(hasher.finalize()))
            }
        }
    }
}

/// Custom key generator that allows for user-defined logic
pub struct CustomKeyGenerator<F>
where
    F: Fn(&RequestDescriptor) -> String + Send + Sync,
{
    generator_fn: F,
}

impl<F> CustomKeyGenerator<F>
where
    F: Fn(&RequestDescriptor) -> String + Send + Sync,
{
    /// Create a new custom key generator
    pub fn new(generator_fn: F) -> Self {
        Self { generator_fn }
    }
}

impl<F> KeyGenerator for CustomKeyGenerator<F>
where
    F: Fn(&RequestDescriptor) -> String + Send + Sync,
{
    fn generate_key(&self, descriptor: &RequestDescriptor) -> String {
        (self.generator_fn)(descriptor)
    }
}
