//! Upload session state.
//!
//! Ephemeral, cache-resident: lives from the first chunk to the terminal
//! chunk. Losing one is cheap (the client restarts the upload), so the
//! durable commit happens only once, at completion. The TTL bounds leaks
//! from abandoned uploads; deletion on success is best-effort.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use rsvp_shared::cache::{CacheError, CacheService};
use rsvp_shared::storage::CompletedPart;

/// One uploaded part's receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadedPart {
    pub part_number: i32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

/// In-flight multipart upload, keyed by the client's `uploadId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Upload id minted by the object store (not the client's `uploadId`).
    pub store_upload_id: String,
    pub bucket_file_path: String,
    pub total_chunks: u32,
    pub original_file_name: String,
    pub mime_type: String,
    pub uploaded_parts: Vec<UploadedPart>,
}

impl UploadSession {
    pub fn cache_key(upload_id: &str) -> String {
        format!("upload:{upload_id}")
    }

    /// Record a part receipt. Same part number overwrites: the last ETag
    /// wins, matching the store's part-upload idempotency.
    pub fn record_part(&mut self, part_number: i32, etag: String) {
        if let Some(existing) = self
            .uploaded_parts
            .iter_mut()
            .find(|p| p.part_number == part_number)
        {
            existing.etag = etag;
        } else {
            self.uploaded_parts.push(UploadedPart { part_number, etag });
        }
    }

    /// Parts sorted by part number, ready for multipart completion.
    /// Chunk arrival order is arbitrary; this is where order is restored.
    pub fn sorted_parts(&self) -> Vec<CompletedPart> {
        let mut parts: Vec<CompletedPart> = self
            .uploaded_parts
            .iter()
            .map(|p| CompletedPart {
                part_number: p.part_number,
                etag: p.etag.clone(),
            })
            .collect();
        parts.sort_by_key(|p| p.part_number);
        parts
    }

    pub async fn load(
        cache: &dyn CacheService,
        upload_id: &str,
    ) -> Result<Option<UploadSession>, CacheError> {
        let Some(json) = cache.get(&Self::cache_key(upload_id)).await? else {
            return Ok(None);
        };

        let session = serde_json::from_str(&json)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        Ok(Some(session))
    }

    pub async fn save(
        &self,
        cache: &dyn CacheService,
        upload_id: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(self)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        cache.set(&Self::cache_key(upload_id), &json, ttl).await
    }

    /// Best-effort removal; the TTL is the backstop.
    pub async fn discard(cache: &dyn CacheService, upload_id: &str) {
        if let Err(e) = cache.delete(&Self::cache_key(upload_id)).await {
            tracing::warn!(upload_id = upload_id, error = %e, "Failed to delete upload session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsvp_shared::cache::InMemoryCacheService;

    fn sample_session() -> UploadSession {
        UploadSession {
            store_upload_id: "mp-1".to_string(),
            bucket_file_path: "uploads/u/reservations.xlsx".to_string(),
            total_chunks: 3,
            original_file_name: "reservations.xlsx".to_string(),
            mime_type: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                .to_string(),
            uploaded_parts: vec![],
        }
    }

    #[test]
    fn test_record_part_overwrites_same_number() {
        let mut session = sample_session();
        session.record_part(1, "\"a\"".to_string());
        session.record_part(2, "\"b\"".to_string());
        session.record_part(1, "\"c\"".to_string());

        assert_eq!(session.uploaded_parts.len(), 2);
        assert_eq!(session.uploaded_parts[0].etag, "\"c\"");
    }

    #[test]
    fn test_sorted_parts_restores_order() {
        let mut session = sample_session();
        session.record_part(3, "\"c\"".to_string());
        session.record_part(1, "\"a\"".to_string());
        session.record_part(2, "\"b\"".to_string());

        let parts = session.sorted_parts();
        assert_eq!(
            parts.iter().map(|p| p.part_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_cache_value_field_names() {
        let mut session = sample_session();
        session.record_part(1, "\"a\"".to_string());

        let json = serde_json::to_value(&session).unwrap();
        assert!(json["storeUploadId"].is_string());
        assert!(json["bucketFilePath"].is_string());
        assert_eq!(json["uploadedParts"][0]["PartNumber"], 1);
        assert_eq!(json["uploadedParts"][0]["ETag"], "\"a\"");
    }

    #[tokio::test]
    async fn test_load_save_round_trip() {
        let cache = InMemoryCacheService::new();
        let session = sample_session();

        session
            .save(&cache, "client-upload-1", Duration::from_secs(60))
            .await
            .unwrap();

        let loaded = UploadSession::load(&cache, "client-upload-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, session);

        assert!(UploadSession::load(&cache, "other").await.unwrap().is_none());

        UploadSession::discard(&cache, "client-upload-1").await;
        assert!(UploadSession::load(&cache, "client-upload-1")
            .await
            .unwrap()
            .is_none());
    }
}
