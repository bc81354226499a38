//! # Outbox Event Model
//!
//! A durable intent-to-publish, created in the same transaction as the
//! business write it announces and drained to the message bus by the
//! dispatcher. The store is the source of truth for delivery state; the
//! bus is only a conduit.
//!
//! ## Claim protocol
//!
//! `NEW` events are claimed in `created_at` order with a bounded
//! `UPDATE … WHERE id IN (SELECT … FOR UPDATE SKIP LOCKED)` so concurrent
//! dispatchers partition the backlog instead of double-claiming. A claim
//! abandoned past the stale threshold is swept back to `NEW` by any peer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgExecutor;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::messaging::envelope::EventEnvelope;

/// Outbox status, mapped to the `event_status` Postgres enum.
///
/// `PROCESSED` is terminal for both success and non-retryable failure; the
/// `error` column distinguishes the two. `FAILED` exists in the schema for
/// operator tooling but is not produced by the core paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    New,
    Processing,
    Published,
    Processed,
    Failed,
}

/// Structured error recorded on an event at consumer finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl EventError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            message: message.into(),
            details: Some(details),
        }
    }
}

/// Outbox record, mapped to the `outbox_events` table.
#[derive(Debug, Clone, FromRow)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub event_name: String,
    pub event: serde_json::Value,
    pub status: EventStatus,
    pub worker_id: Option<String>,
    pub processing_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, event_name, event, status, worker_id, processing_at,
           published_at, processed_at, error, created_at
      FROM outbox_events
"#;

impl OutboxEvent {
    /// Insert a NEW event carrying the serialized envelope.
    ///
    /// Callers run this inside the same transaction as the business write
    /// the event announces.
    pub async fn insert_new<'e, E>(
        executor: E,
        envelope: &EventEnvelope,
    ) -> Result<Uuid, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let event_json =
            serde_json::to_value(envelope).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO outbox_events (event_name, event, status)
            VALUES ($1, $2, 'NEW')
            RETURNING id
            "#,
        )
        .bind(envelope.event_name())
        .bind(event_json)
        .fetch_one(executor)
        .await?;

        Ok(id)
    }

    /// Claim up to `batch_size` NEW events for this worker, oldest first.
    ///
    /// Returns the number of events claimed. The conditional update is the
    /// mutual-exclusion mechanism; no application-level lock exists.
    pub async fn claim_batch(
        pool: &PgPool,
        worker_id: &str,
        batch_size: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
               SET status = 'PROCESSING',
                   worker_id = $1,
                   processing_at = now()
             WHERE id IN (SELECT id
                            FROM outbox_events
                           WHERE status = 'NEW'
                           ORDER BY created_at ASC
                           LIMIT $2
                           FOR UPDATE SKIP LOCKED)
            "#,
        )
        .bind(worker_id)
        .bind(batch_size)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Read back the events this worker currently holds.
    pub async fn fetch_claimed(
        pool: &PgPool,
        worker_id: &str,
    ) -> Result<Vec<OutboxEvent>, sqlx::Error> {
        sqlx::query_as::<_, OutboxEvent>(&format!(
            r#"
            {SELECT_COLUMNS}
             WHERE status = 'PROCESSING'
               AND worker_id = $1
               AND processing_at <= now()
             ORDER BY created_at ASC
            "#
        ))
        .bind(worker_id)
        .fetch_all(pool)
        .await
    }

    /// Confirm a successful publish, clearing the claim lease.
    ///
    /// Matches only while this worker still holds the claim; zero rows
    /// means concurrent recovery interleaved and the caller must abort its
    /// transaction (the event will be re-published, which the at-least-once
    /// contract absorbs).
    pub async fn confirm_published<'e, E>(
        executor: E,
        id: Uuid,
        worker_id: &str,
    ) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
               SET status = 'PUBLISHED',
                   published_at = now(),
                   worker_id = NULL,
                   processing_at = NULL
             WHERE id = $1
               AND status = 'PROCESSING'
               AND worker_id = $2
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Sweep abandoned PROCESSING claims back to NEW.
    ///
    /// Wall-clock lease rather than heartbeat: the dispatcher is stateless
    /// beyond its worker id, so any peer can recover a dead one.
    pub async fn recover_stale(
        pool: &PgPool,
        stale_threshold_seconds: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
               SET status = 'NEW',
                   worker_id = NULL,
                   processing_at = NULL
             WHERE status = 'PROCESSING'
               AND processing_at < now() - make_interval(secs => $1::double precision)
            "#,
        )
        .bind(stale_threshold_seconds)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Mark an event terminally processed by the consumer.
    ///
    /// `error` is populated when processing finished with row errors or a
    /// non-retryable failure; readers distinguish "done" from "failed-done"
    /// by inspecting it.
    pub async fn mark_processed<'e, E>(
        executor: E,
        id: Uuid,
        error: Option<&EventError>,
    ) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let error_json = match error {
            Some(e) => {
                Some(serde_json::to_value(e).map_err(|e| sqlx::Error::Encode(Box::new(e)))?)
            }
            None => None,
        };

        let result = sqlx::query(
            r#"
            UPDATE outbox_events
               SET status = 'PROCESSED',
                   processed_at = now(),
                   error = $2
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error_json)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<OutboxEvent>, sqlx::Error> {
        sqlx::query_as::<_, OutboxEvent>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_error_serialization() {
        let err = EventError::new("Processing completed with 3 errors");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["message"], "Processing completed with 3 errors");
        assert!(json.get("details").is_none());

        let err = EventError::with_details(
            "Processing completed with 1 errors",
            serde_json::json!([{"row": 2, "error": "Missing guest_name"}]),
        );
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["details"][0]["row"], 2);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            EventStatus::New,
            EventStatus::Processing,
            EventStatus::Published,
            EventStatus::Processed,
            EventStatus::Failed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            let back: EventStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }
    }
}
