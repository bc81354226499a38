//! # Task Processor
//!
//! Consumes `task.created.event` messages from `q.worker.task` (prefetch 1,
//! one in-flight message per worker), idempotently claims the task, decodes
//! and validates the spreadsheet, upserts reservations, and finalizes the
//! Task and its outbox Event.
//!
//! ## Error classification
//!
//! - Poison input (no eventId, no payload, unknown event name): ack-drop.
//! - Claim miss: another worker owns the task or it already finished;
//!   ack (this is the second line of defense against duplicate delivery).
//! - Store write conflict (SQLSTATE 40001/40P01): nack(requeue=false),
//!   which routes through the DLX delay queue and redelivers later.
//! - Anything else mid-flight: abort, best-effort mark Task FAILED and
//!   Event PROCESSED outside the transaction, ack so the message cannot
//!   loop forever.
//! - File-level failure (download error, corrupt workbook, empty sheet):
//!   the task fails with one file-level error, inside the normal path.

pub mod validation;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use rsvp_shared::config::{ProcessorConfig, UpsertMode};
use rsvp_shared::messaging::envelope::{TaskCreatedPayload, TaskEventMessage};
use rsvp_shared::messaging::RabbitBus;
use rsvp_shared::models::outbox_event::{EventError, OutboxEvent};
use rsvp_shared::models::reservation::{NewReservation, Reservation};
use rsvp_shared::models::task::{RowError, Task, TaskStatus};
use rsvp_shared::spreadsheet;
use rsvp_shared::storage::ObjectStore;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Finalization matched zero rows: the claim was lost mid-flight.
    #[error("Task {task_id} disappeared during finalization")]
    LostClaim { task_id: Uuid },
}

impl ProcessorError {
    /// Transient store conflict worth a delayed retry.
    pub fn is_write_conflict(&self) -> bool {
        match self {
            ProcessorError::Database(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }
}

/// How a message leaves the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Ack,
    /// Reject without requeue: the DLX routes it into the delay queue.
    DelayedRetry,
}

/// Outcome of processing one parsed task event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Processed,
    /// Claim miss: someone else owns or already finished the task.
    AlreadyHandled,
}

pub struct TaskProcessor {
    pool: PgPool,
    bus: Arc<RabbitBus>,
    storage: Arc<dyn ObjectStore>,
    config: ProcessorConfig,
    worker_id: String,
    is_running: Arc<AtomicBool>,
}

impl TaskProcessor {
    pub fn new(
        pool: PgPool,
        bus: Arc<RabbitBus>,
        storage: Arc<dyn ObjectStore>,
        config: ProcessorConfig,
        worker_id: String,
    ) -> Self {
        Self {
            pool,
            bus,
            storage,
            config,
            worker_id,
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Consume until the channel closes or `stop` is called.
    ///
    /// On shutdown, the in-flight message (if any) finishes or is cut by
    /// connection close; unacked messages are redelivered to a peer.
    pub async fn run(&self) -> Result<(), rsvp_shared::RsvpError> {
        let consumer_tag = format!("processor-{}", self.worker_id);
        let mut consumer = self.bus.consume(&self.config.queue, &consumer_tag).await?;

        self.is_running.store(true, Ordering::SeqCst);
        info!(
            queue = %self.config.queue,
            worker_id = %self.worker_id,
            upsert_mode = ?self.config.upsert_mode,
            "Task processor consuming"
        );

        while let Some(delivery) = consumer.next().await {
            if !self.is_running.load(Ordering::SeqCst) {
                break;
            }

            match delivery {
                Ok(delivery) => self.handle_delivery(delivery).await,
                Err(e) => {
                    error!(error = %e, "Consumer stream error");
                    break;
                }
            }
        }

        info!("Task processor stopped");
        Ok(())
    }

    /// Stop pulling new work; the consumer loop exits on the next delivery
    /// or when the connection closes.
    pub fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let disposition = match TaskEventMessage::from_bytes(&delivery.data) {
            Err(rejection) => {
                warn!(reason = %rejection, "Dropping undeliverable message");
                Disposition::Ack
            }
            Ok(message) => self.dispose(&message).await,
        };

        let result = match disposition {
            Disposition::Ack => delivery.ack(BasicAckOptions::default()).await,
            Disposition::DelayedRetry => {
                delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await
            }
        };

        if let Err(e) = result {
            // The broker will redeliver; the claim guard absorbs it.
            error!(error = %e, "Failed to settle delivery");
        }
    }

    #[instrument(skip(self, message), fields(task_id = %message.payload.task_id, event_id = %message.event_id))]
    async fn dispose(&self, message: &TaskEventMessage) -> Disposition {
        match self.process_message(message).await {
            Ok(ProcessOutcome::Processed) => Disposition::Ack,
            Ok(ProcessOutcome::AlreadyHandled) => {
                debug!("Task already handled; acking duplicate delivery");
                Disposition::Ack
            }
            Err(e) if e.is_write_conflict() => {
                warn!(error = %e, "Write conflict; routing through delay queue");
                Disposition::DelayedRetry
            }
            Err(e) => {
                error!(error = %e, "Unrecoverable processing error; failing task");
                self.fail_task_fallback(message, &e).await;
                Disposition::Ack
            }
        }
    }

    /// Process one parsed task event under the configured transaction
    /// shape. `run` drives this from the consumer; it is also the seam the
    /// integration tests use.
    pub async fn process_message(
        &self,
        message: &TaskEventMessage,
    ) -> Result<ProcessOutcome, ProcessorError> {
        match self.config.upsert_mode {
            UpsertMode::SingleTransaction => self.process_single_transaction(message).await,
            UpsertMode::Batched => self.process_batched(message).await,
        }
    }

    /// All-or-nothing: claim, every upsert and the finalization commit or
    /// roll back together.
    async fn process_single_transaction(
        &self,
        message: &TaskEventMessage,
    ) -> Result<ProcessOutcome, ProcessorError> {
        let task_id = message.payload.task_id;
        let mut tx = self.pool.begin().await?;

        if !Task::claim(&mut *tx, task_id, &self.worker_id).await? {
            tx.rollback().await?;
            return Ok(ProcessOutcome::AlreadyHandled);
        }

        let (valid, errors) = self.load_and_validate(&message.payload).await;

        for row in &valid {
            Reservation::upsert(&mut *tx, row).await?;
        }

        let final_status = final_status_for(&errors);
        let matched = Task::finalize(&mut *tx, task_id, final_status, &errors).await?;
        if matched == 0 {
            tx.rollback().await?;
            return Err(ProcessorError::LostClaim { task_id });
        }

        OutboxEvent::mark_processed(&mut *tx, message.event_id, event_error_for(&errors).as_ref())
            .await?;

        tx.commit().await?;

        info!(
            status = ?final_status,
            upserted = valid.len(),
            row_errors = errors.len(),
            "Task finalized"
        );
        Ok(ProcessOutcome::Processed)
    }

    /// Batched: the claim commits alone, upserts run in short chunked
    /// transactions, and Task+Event finalize last. A crash mid-file leaves
    /// partial reservations but no finalized task; the upserts are
    /// idempotent by key, so redelivery converges.
    async fn process_batched(
        &self,
        message: &TaskEventMessage,
    ) -> Result<ProcessOutcome, ProcessorError> {
        let task_id = message.payload.task_id;

        if !Task::claim(&self.pool, task_id, &self.worker_id).await? {
            return Ok(ProcessOutcome::AlreadyHandled);
        }

        let (valid, errors) = self.load_and_validate(&message.payload).await;

        for batch in valid.chunks(self.config.upsert_batch_size) {
            let mut tx = self.pool.begin().await?;
            for row in batch {
                Reservation::upsert(&mut *tx, row).await?;
            }
            tx.commit().await?;
        }

        let final_status = final_status_for(&errors);
        let mut tx = self.pool.begin().await?;
        let matched = Task::finalize(&mut *tx, task_id, final_status, &errors).await?;
        if matched == 0 {
            tx.rollback().await?;
            return Err(ProcessorError::LostClaim { task_id });
        }
        OutboxEvent::mark_processed(&mut *tx, message.event_id, event_error_for(&errors).as_ref())
            .await?;
        tx.commit().await?;

        info!(
            status = ?final_status,
            upserted = valid.len(),
            row_errors = errors.len(),
            "Task finalized (batched)"
        );
        Ok(ProcessOutcome::Processed)
    }

    /// Download, decode and validate the artifact. Any file-level failure
    /// becomes a single `{row: null}` error and an empty upsert set; the
    /// task fails through the normal finalization path.
    async fn load_and_validate(
        &self,
        payload: &TaskCreatedPayload,
    ) -> (Vec<NewReservation>, Vec<RowError>) {
        let bytes = match self.storage.get_object(&payload.file_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file_path = %payload.file_path, error = %e, "Artifact download failed");
                return (
                    vec![],
                    vec![RowError::file_level(format!(
                        "Failed to download file: {e}"
                    ))],
                );
            }
        };

        let sheet = match spreadsheet::read_first_sheet(&bytes) {
            Ok(sheet) => sheet,
            Err(e) => {
                warn!(file_path = %payload.file_path, error = %e, "Workbook rejected");
                return (vec![], vec![RowError::file_level(e.to_string())]);
            }
        };

        let mut validator = validation::RowValidator::new();
        let mut valid = Vec::new();
        let mut errors = Vec::new();

        for row in sheet.rows() {
            match validator.validate(row) {
                validation::RowOutcome::Valid(reservation) => valid.push(reservation),
                validation::RowOutcome::Invalid(error) => errors.push(error),
            }
        }

        (valid, errors)
    }

    /// Best-effort terminal marks after an aborted transaction, so the
    /// redelivered or duplicate message cannot loop forever.
    async fn fail_task_fallback(&self, message: &TaskEventMessage, cause: &ProcessorError) {
        let errors = vec![RowError::file_level(format!("Processing error: {cause}"))];

        if let Err(e) =
            Task::fail_unfinished(&self.pool, message.payload.task_id, &errors).await
        {
            error!(error = %e, "Fallback task failure mark did not apply");
        }

        let event_error = EventError::new(format!("Processing error: {cause}"));
        if let Err(e) =
            OutboxEvent::mark_processed(&self.pool, message.event_id, Some(&event_error)).await
        {
            error!(error = %e, "Fallback event mark did not apply");
        }
    }
}

fn final_status_for(errors: &[RowError]) -> TaskStatus {
    if errors.is_empty() {
        TaskStatus::Completed
    } else {
        TaskStatus::Failed
    }
}

fn event_error_for(errors: &[RowError]) -> Option<EventError> {
    if errors.is_empty() {
        return None;
    }

    Some(EventError::with_details(
        format!("Processing completed with {} errors", errors.len()),
        serde_json::to_value(errors).unwrap_or(serde_json::Value::Null),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_status_for() {
        assert_eq!(final_status_for(&[]), TaskStatus::Completed);
        assert_eq!(
            final_status_for(&[RowError::file_level("boom")]),
            TaskStatus::Failed
        );
    }

    #[derive(Debug)]
    struct FakeDbError(&'static str);

    impl std::fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "fake database error ({})", self.0)
        }
    }

    impl std::error::Error for FakeDbError {}

    impl sqlx::error::DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            "fake database error"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.0.into())
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }
    }

    #[test]
    fn test_write_conflict_classification() {
        for code in ["40001", "40P01"] {
            let error =
                ProcessorError::Database(sqlx::Error::Database(Box::new(FakeDbError(code))));
            assert!(error.is_write_conflict(), "{code} is a write conflict");
        }

        let unique_violation =
            ProcessorError::Database(sqlx::Error::Database(Box::new(FakeDbError("23505"))));
        assert!(!unique_violation.is_write_conflict());

        let lost_claim = ProcessorError::LostClaim {
            task_id: Uuid::new_v4(),
        };
        assert!(!lost_claim.is_write_conflict());
    }

    #[test]
    fn test_event_error_for_counts_errors() {
        assert!(event_error_for(&[]).is_none());

        let errors = vec![
            RowError::at_row(2, "Duplicate reservation_id: R-1"),
            RowError::at_row(5, "Invalid status: BOOKED"),
        ];
        let event_error = event_error_for(&errors).unwrap();
        assert_eq!(event_error.message, "Processing completed with 2 errors");

        let details = event_error.details.unwrap();
        assert_eq!(details[0]["row"], 2);
        assert_eq!(details[1]["row"], 5);
    }
}
