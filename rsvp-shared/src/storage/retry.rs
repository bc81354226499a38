//! Bounded-retry decorator for object stores.
//!
//! Transient infrastructure faults (5xx-equivalents) are retried in-process
//! with exponential backoff and jitter; everything else propagates
//! immediately. Non-retryable failures reach the caller's own error
//! classification (the processor's DLQ path, the assembler's HTTP 500).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use tracing::warn;

use super::{CompletedPart, ObjectStore, StorageError, StorageResult};

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fractional jitter applied symmetrically (0.25 = ±25%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based attempt that just failed).
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.max_delay);

        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        capped.mul_f64(factor.max(0.0))
    }

    /// Jitter-free bounds of `delay_for`, for tests.
    pub fn delay_bounds(&self, attempt: u32) -> (Duration, Duration) {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.max_delay);
        (
            capped.mul_f64(1.0 - self.jitter),
            capped.mul_f64(1.0 + self.jitter),
        )
    }
}

/// Object store wrapper retrying transient errors.
pub struct RetryingObjectStore {
    inner: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
}

impl RetryingObjectStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    pub fn with_policy(inner: Arc<dyn ObjectStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = StorageResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient storage error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl ObjectStore for RetryingObjectStore {
    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> StorageResult<String> {
        self.run("create_multipart_upload", || {
            self.inner.create_multipart_upload(key, content_type)
        })
        .await
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<String> {
        self.run("upload_part", || {
            self.inner.upload_part(key, upload_id, part_number, data.clone())
        })
        .await
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()> {
        self.run("complete_multipart_upload", || {
            self.inner.complete_multipart_upload(key, upload_id, parts)
        })
        .await
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        self.run("abort_multipart_upload", || {
            self.inner.abort_multipart_upload(key, upload_id)
        })
        .await
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        self.run("get_object", || self.inner.get_object(key)).await
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;

    #[test]
    fn test_delay_bounds() {
        let policy = RetryPolicy::default();

        let (lo, hi) = policy.delay_bounds(1);
        assert_eq!(lo, Duration::from_millis(750));
        assert_eq!(hi, Duration::from_millis(1_250));

        let (lo, hi) = policy.delay_bounds(2);
        assert_eq!(lo, Duration::from_millis(1_500));
        assert_eq!(hi, Duration::from_millis(2_500));

        // Exponent would be 4s; cap holds it at 5s before jitter.
        let (_, hi) = policy.delay_bounds(4);
        assert_eq!(hi, Duration::from_millis(6_250));
    }

    #[test]
    fn test_delay_within_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 1..=4 {
            let (lo, hi) = policy.delay_bounds(attempt);
            for _ in 0..32 {
                let d = policy.delay_for(attempt);
                assert!(d >= lo && d <= hi, "attempt {attempt}: {d:?} out of bounds");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        let inner = Arc::new(MemoryObjectStore::new());
        inner.put_object("k", Bytes::from("payload")).await;
        inner.fail_next_gets(2);

        let store = RetryingObjectStore::new(inner);
        let data = store.get_object("k").await.unwrap();
        assert_eq!(&data[..], b"payload");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_propagate() {
        let inner = Arc::new(MemoryObjectStore::new());
        inner.put_object("k", Bytes::from("payload")).await;
        inner.fail_next_gets(3);

        let store = RetryingObjectStore::new(inner);
        assert!(store.get_object("k").await.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let inner = Arc::new(MemoryObjectStore::new());
        let store = RetryingObjectStore::new(inner);

        // Completes immediately; a retry loop would sleep for seconds.
        let start = std::time::Instant::now();
        assert!(matches!(
            store.get_object("missing").await,
            Err(StorageError::NotFound { .. })
        ));
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
