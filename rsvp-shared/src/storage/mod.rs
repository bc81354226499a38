//! # Object Store
//!
//! Multipart-capable blob storage behind a provider trait: exactly the
//! contract the upload assembler and the task processor need
//! (init/part/complete/abort + get). Two providers ship in-tree, local
//! filesystem and memory, and cloud SDKs bind behind the same trait.
//!
//! Transient faults are handled by [`RetryingObjectStore`], which wraps any
//! provider with bounded exponential backoff.

pub mod providers;
mod retry;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use providers::filesystem::FsObjectStore;
pub use providers::memory::MemoryObjectStore;
pub use retry::{RetryPolicy, RetryingObjectStore};

/// Storage-layer errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Multipart upload not found: {upload_id}")]
    UploadNotFound { upload_id: String },

    #[error("Invalid part {part_number} for upload {upload_id}: {message}")]
    InvalidPart {
        upload_id: String,
        part_number: i32,
        message: String,
    },

    /// Infrastructure fault worth retrying (5xx-equivalent).
    #[error("Transient storage error: {message}")]
    Transient { message: String },

    #[error("Storage I/O error: {message}")]
    Io { message: String },
}

impl StorageError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn upload_not_found(upload_id: impl Into<String>) -> Self {
        Self::UploadNotFound {
            upload_id: upload_id.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Whether an in-process retry can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Transient { .. })
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// An uploaded part identified for multipart completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number.
    pub part_number: i32,
    pub etag: String,
}

/// Provider-agnostic object store with multipart upload support.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Initiate a multipart upload for `key`, returning the upload id.
    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> StorageResult<String>;

    /// Upload one part (1-based `part_number`), returning its ETag.
    ///
    /// Re-uploading a part number overwrites the previous bytes; the last
    /// ETag wins.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<String>;

    /// Assemble the object from `parts`, in the given order.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()>;

    /// Discard an in-flight multipart upload. Aborting an unknown upload is
    /// not an error (abort is a best-effort cleanup path).
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()>;

    /// Fetch a whole object, buffered.
    async fn get_object(&self, key: &str) -> StorageResult<Bytes>;

    fn provider_name(&self) -> &'static str;
}

/// Build the configured provider wrapped in the transient-retry decorator.
pub fn build_store(config: &crate::config::ObjectStoreConfig) -> std::sync::Arc<dyn ObjectStore> {
    use crate::config::ObjectStoreProvider;

    let inner: std::sync::Arc<dyn ObjectStore> = match config.provider {
        ObjectStoreProvider::Filesystem => std::sync::Arc::new(FsObjectStore::from_config(config)),
        ObjectStoreProvider::Memory => std::sync::Arc::new(MemoryObjectStore::new()),
    };
    std::sync::Arc::new(RetryingObjectStore::new(inner))
}

/// Content-addressed pseudo-ETag shared by the in-tree providers.
pub(crate) fn compute_etag(data: &[u8]) -> String {
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    data.hash(&mut hasher);
    format!("\"{:016x}-{}\"", hasher.finish(), data.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(StorageError::transient("503").is_retryable());
        assert!(!StorageError::not_found("k").is_retryable());
        assert!(!StorageError::io("disk full").is_retryable());
        assert!(!StorageError::upload_not_found("u").is_retryable());
    }

    #[test]
    fn test_etag_is_stable_and_content_sensitive() {
        let a = compute_etag(b"part one");
        let b = compute_etag(b"part one");
        let c = compute_etag(b"part two");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
