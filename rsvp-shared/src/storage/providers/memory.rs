//! In-memory object store for tests and development.
//!
//! Supports the full multipart contract plus transient-fault injection so
//! retry behavior can be exercised without a real backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::storage::{compute_etag, CompletedPart, ObjectStore, StorageError, StorageResult};

#[derive(Debug)]
struct PendingUpload {
    key: String,
    parts: HashMap<i32, Bytes>,
}

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Bytes>>,
    uploads: RwLock<HashMap<String, PendingUpload>>,
    /// Remaining `get_object` calls to fail with a transient error.
    failing_gets: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` `get_object` calls fail with a transient error
    /// (5xx-equivalent), for retry tests.
    pub fn fail_next_gets(&self, n: usize) {
        self.failing_gets.store(n, Ordering::SeqCst);
    }

    /// Directly seed an object, for tests.
    pub async fn put_object(&self, key: &str, data: Bytes) {
        let mut objects = self.objects.write().await;
        objects.insert(key.to_string(), data);
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn pending_upload_count(&self) -> usize {
        self.uploads.read().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn create_multipart_upload(
        &self,
        key: &str,
        _content_type: &str,
    ) -> StorageResult<String> {
        let upload_id = Uuid::new_v4().to_string();
        let mut uploads = self.uploads.write().await;
        uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                parts: HashMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<String> {
        if part_number < 1 {
            return Err(StorageError::InvalidPart {
                upload_id: upload_id.to_string(),
                part_number,
                message: "part numbers are 1-based".to_string(),
            });
        }

        let etag = compute_etag(&data);
        let mut uploads = self.uploads.write().await;
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| StorageError::upload_not_found(upload_id))?;
        upload.parts.insert(part_number, data);
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()> {
        let mut uploads = self.uploads.write().await;
        let upload = uploads
            .remove(upload_id)
            .ok_or_else(|| StorageError::upload_not_found(upload_id))?;

        let mut assembled = Vec::new();
        for part in parts {
            let data = upload.parts.get(&part.part_number).ok_or_else(|| {
                StorageError::InvalidPart {
                    upload_id: upload_id.to_string(),
                    part_number: part.part_number,
                    message: "part was never uploaded".to_string(),
                }
            })?;
            assembled.extend_from_slice(data);
        }

        drop(uploads);

        let mut objects = self.objects.write().await;
        objects.insert(upload.key.clone(), Bytes::from(assembled));
        debug_assert_eq!(upload.key, key);
        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> StorageResult<()> {
        let mut uploads = self.uploads.write().await;
        uploads.remove(upload_id);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        let remaining = self.failing_gets.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .failing_gets
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(StorageError::transient("injected 503"));
        }

        let objects = self.objects.read().await;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_multipart_round_trip_out_of_order() {
        let store = MemoryObjectStore::new();
        let upload_id = store
            .create_multipart_upload("uploads/a/file.xlsx", "application/octet-stream")
            .await
            .unwrap();

        // Parts arrive out of order; completion order decides assembly.
        let etag2 = store
            .upload_part("uploads/a/file.xlsx", &upload_id, 2, Bytes::from("world"))
            .await
            .unwrap();
        let etag1 = store
            .upload_part("uploads/a/file.xlsx", &upload_id, 1, Bytes::from("hello "))
            .await
            .unwrap();

        store
            .complete_multipart_upload(
                "uploads/a/file.xlsx",
                &upload_id,
                &[
                    CompletedPart {
                        part_number: 1,
                        etag: etag1,
                    },
                    CompletedPart {
                        part_number: 2,
                        etag: etag2,
                    },
                ],
            )
            .await
            .unwrap();

        let data = store.get_object("uploads/a/file.xlsx").await.unwrap();
        assert_eq!(&data[..], b"hello world");
        assert_eq!(store.pending_upload_count().await, 0);
    }

    #[tokio::test]
    async fn test_part_reupload_overwrites() {
        let store = MemoryObjectStore::new();
        let upload_id = store
            .create_multipart_upload("k", "application/octet-stream")
            .await
            .unwrap();

        store
            .upload_part("k", &upload_id, 1, Bytes::from("first"))
            .await
            .unwrap();
        let etag = store
            .upload_part("k", &upload_id, 1, Bytes::from("second"))
            .await
            .unwrap();

        store
            .complete_multipart_upload(
                "k",
                &upload_id,
                &[CompletedPart {
                    part_number: 1,
                    etag,
                }],
            )
            .await
            .unwrap();

        assert_eq!(&store.get_object("k").await.unwrap()[..], b"second");
    }

    #[tokio::test]
    async fn test_abort_discards_upload() {
        let store = MemoryObjectStore::new();
        let upload_id = store
            .create_multipart_upload("k", "application/octet-stream")
            .await
            .unwrap();
        store
            .upload_part("k", &upload_id, 1, Bytes::from("data"))
            .await
            .unwrap();

        store.abort_multipart_upload("k", &upload_id).await.unwrap();
        assert_eq!(store.pending_upload_count().await, 0);
        assert!(matches!(
            store.get_object("k").await,
            Err(StorageError::NotFound { .. })
        ));

        // Abort twice: still fine.
        store.abort_multipart_upload("k", &upload_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_completing_unknown_part_fails() {
        let store = MemoryObjectStore::new();
        let upload_id = store
            .create_multipart_upload("k", "application/octet-stream")
            .await
            .unwrap();

        let result = store
            .complete_multipart_upload(
                "k",
                &upload_id,
                &[CompletedPart {
                    part_number: 1,
                    etag: "\"x\"".to_string(),
                }],
            )
            .await;

        assert!(matches!(result, Err(StorageError::InvalidPart { .. })));
    }

    #[tokio::test]
    async fn test_injected_transient_failures() {
        let store = MemoryObjectStore::new();
        store.put_object("k", Bytes::from("v")).await;
        store.fail_next_gets(2);

        assert!(store.get_object("k").await.unwrap_err().is_retryable());
        assert!(store.get_object("k").await.unwrap_err().is_retryable());
        assert_eq!(&store.get_object("k").await.unwrap()[..], b"v");
    }
}
