//! # Session Cache
//!
//! Key→JSON store with TTL used for in-flight upload sessions. Session
//! state is cache-only because it is cheap to recover (the client retries
//! the upload); the TTL bounds leaks from abandoned uploads.

pub mod providers;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use providers::in_memory::InMemoryCacheService;
pub use providers::redis::RedisCacheService;

/// Cache-layer errors.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache connection error: {0}")]
    ConnectionError(String),

    #[error("Cache backend error: {0}")]
    BackendError(String),

    #[error("Cache serialization error: {0}")]
    SerializationError(String),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Provider-agnostic cache operations.
///
/// Values are JSON strings; serialization stays with the caller so the
/// cache layer needs no knowledge of session shapes.
#[async_trait]
pub trait CacheService: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a value with a TTL. Overwrites any existing value and resets the
    /// TTL (idempotent overwrite).
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    async fn health_check(&self) -> CacheResult<bool>;

    fn provider_name(&self) -> &'static str;
}
