//! Filesystem object store.
//!
//! Objects live under `<root>/<bucket>/<key>`; in-flight multipart uploads
//! stage parts under `<root>/.multipart/<upload_id>/` until completion
//! concatenates them in part order.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::ObjectStoreConfig;
use crate::storage::{compute_etag, CompletedPart, ObjectStore, StorageError, StorageResult};

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    bucket: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    pub fn from_config(config: &ObjectStoreConfig) -> Self {
        Self::new(&config.root_path, &config.bucket_name)
    }

    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        // Keys are produced by the assembler from validated file names, but
        // refuse traversal outright rather than trusting that.
        if key.split('/').any(|segment| segment == "..") {
            return Err(StorageError::io(format!("invalid object key: {key}")));
        }
        Ok(self.root.join(&self.bucket).join(key))
    }

    fn upload_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join(".multipart").join(upload_id)
    }

    fn part_path(&self, upload_id: &str, part_number: i32) -> PathBuf {
        self.upload_dir(upload_id)
            .join(format!("{part_number}.part"))
    }

    fn key_marker_path(&self, upload_id: &str) -> PathBuf {
        self.upload_dir(upload_id).join("key")
    }

    async fn ensure_parent(path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn create_multipart_upload(
        &self,
        key: &str,
        _content_type: &str,
    ) -> StorageResult<String> {
        self.object_path(key)?;

        let upload_id = Uuid::new_v4().to_string();
        let dir = self.upload_dir(&upload_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(e.to_string()))?;

        tokio::fs::write(self.key_marker_path(&upload_id), key.as_bytes())
            .await
            .map_err(|e| StorageError::io(e.to_string()))?;

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

        let dir = self.upload_dir(upload_id);
        if !tokio::fs::try_exists(&dir)
            .await
            .map_err(|e| StorageError::io(e.to_string()))?
        {
            return Err(StorageError::upload_not_found(upload_id));
        }

        let etag = compute_etag(&data);
        tokio::fs::write(self.part_path(upload_id, part_number), &data)
            .await
            .map_err(|e| StorageError::io(e.to_string()))?;

        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()> {
        let dir = self.upload_dir(upload_id);
        if !tokio::fs::try_exists(&dir)
            .await
            .map_err(|e| StorageError::io(e.to_string()))?
        {
            return Err(StorageError::upload_not_found(upload_id));
        }

        let target = self.object_path(key)?;
        Self::ensure_parent(&target).await?;

        let mut out = tokio::fs::File::create(&target)
            .await
            .map_err(|e| StorageError::io(e.to_string()))?;

        for part in parts {
            let data = tokio::fs::read(self.part_path(upload_id, part.part_number))
                .await
                .map_err(|_| StorageError::InvalidPart {
                    upload_id: upload_id.to_string(),
                    part_number: part.part_number,
                    message: "part was never uploaded".to_string(),
                })?;
            out.write_all(&data)
                .await
                .map_err(|e| StorageError::io(e.to_string()))?;
        }

        out.flush()
            .await
            .map_err(|e| StorageError::io(e.to_string()))?;

        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(e.to_string()))?;

        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> StorageResult<()> {
        match tokio::fs::remove_dir_all(self.upload_dir(upload_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(e.to_string())),
        }
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(key))
            }
            Err(e) => Err(StorageError::io(e.to_string())),
        }
    }

    fn provider_name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> FsObjectStore {
        let dir = std::env::temp_dir().join(format!("rsvp-fs-store-{}", Uuid::new_v4()));
        FsObjectStore::new(dir, "test-bucket")
    }

    #[tokio::test]
    async fn test_multipart_round_trip() {
        let store = temp_store();
        let key = "uploads/session/report.xlsx";
        let upload_id = store
            .create_multipart_upload(key, "application/octet-stream")
            .await
            .unwrap();

        let etag1 = store
            .upload_part(key, &upload_id, 1, Bytes::from("alpha "))
            .await
            .unwrap();
        let etag2 = store
            .upload_part(key, &upload_id, 2, Bytes::from("beta"))
            .await
            .unwrap();

        store
            .complete_multipart_upload(
                key,
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

        assert_eq!(&store.get_object(key).await.unwrap()[..], b"alpha beta");
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let store = temp_store();
        assert!(matches!(
            store.get_object("nope").await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_traversal_key_rejected() {
        let store = temp_store();
        assert!(store.get_object("../outside").await.is_err());
    }

    #[tokio::test]
    async fn test_abort_unknown_upload_is_ok() {
        let store = temp_store();
        store.abort_multipart_upload("k", "ghost").await.unwrap();
    }
}
