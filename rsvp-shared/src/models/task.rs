//! # Task Model
//!
//! A task is the user-visible unit of work: one uploaded spreadsheet to be
//! validated and folded into the reservation store. Tasks are created by
//! the ingress in the same transaction as their outbox event and are
//! claimed, processed and finalized by the worker fleet.
//!
//! ## Claiming
//!
//! The `(status, worker_id, processing_at)` triple is only ever mutated via
//! conditional updates; `rows_affected` arbitrates between competing
//! workers. A claim that matches zero rows means another worker owns the
//! task or it already reached a terminal state.
//!
//! ## Status lifecycle
//!
//! `PENDING → IN_PROGRESS → (COMPLETED | FAILED)`; terminal states never
//! revert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgExecutor;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::messaging::envelope::EventEnvelope;
use crate::models::outbox_event::OutboxEvent;

/// Task status, mapped to the `task_status` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A single row- or file-level processing error, kept in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-indexed row number counted from the header; `None` for file-level
    /// failures (missing sheet, corrupt workbook, download error).
    pub row: Option<i64>,
    pub error: String,
}

impl RowError {
    pub fn at_row(row: i64, error: impl Into<String>) -> Self {
        Self {
            row: Some(row),
            error: error.into(),
        }
    }

    pub fn file_level(error: impl Into<String>) -> Self {
        Self {
            row: None,
            error: error.into(),
        }
    }
}

/// Task record, mapped to the `tasks` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub task_id: Uuid,
    pub file_path: String,
    pub original_file_name: String,
    pub status: TaskStatus,
    pub errors: Json<Vec<RowError>>,
    pub worker_id: Option<String>,
    pub processing_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for task creation.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_id: Uuid,
    pub file_path: String,
    pub original_file_name: String,
}

impl Task {
    /// Create a task and its outbox event in a single transaction.
    ///
    /// This is the commit point of the upload assembler: after this call
    /// the dispatcher can never observe a task without its event, nor an
    /// event without its task.
    pub async fn create_with_outbox_event(
        pool: &PgPool,
        new_task: NewTask,
        envelope: &EventEnvelope,
    ) -> Result<Uuid, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tasks (task_id, file_path, original_file_name, status)
            VALUES ($1, $2, $3, 'PENDING')
            "#,
        )
        .bind(new_task.task_id)
        .bind(&new_task.file_path)
        .bind(&new_task.original_file_name)
        .execute(&mut *tx)
        .await?;

        OutboxEvent::insert_new(&mut *tx, envelope).await?;

        tx.commit().await?;
        Ok(new_task.task_id)
    }

    /// Atomically claim a PENDING task for this worker.
    ///
    /// Returns `false` when no row matched: another worker owns the task,
    /// or it was already processed or cancelled. Callers must treat that as
    /// "handled" and acknowledge the message.
    pub async fn claim<'e, E>(
        executor: E,
        task_id: Uuid,
        worker_id: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE tasks
               SET status = 'IN_PROGRESS',
                   started_at = now(),
                   worker_id = $2,
                   processing_at = now(),
                   updated_at = now()
             WHERE task_id = $1
               AND status = 'PENDING'
            "#,
        )
        .bind(task_id)
        .bind(worker_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Finalize a task with its terminal status and accumulated errors,
    /// clearing the claim lease.
    ///
    /// Returns the number of rows matched so callers inside a transaction
    /// can abort on zero (lost claim).
    pub async fn finalize<'e, E>(
        executor: E,
        task_id: Uuid,
        status: TaskStatus,
        errors: &[RowError],
    ) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE tasks
               SET status = $2,
                   completed_at = now(),
                   errors = $3,
                   worker_id = NULL,
                   processing_at = NULL,
                   updated_at = now()
             WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .bind(status)
        .bind(Json(errors))
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Best-effort failure mark for the fallback path, outside any
    /// transaction. Terminal states are left untouched.
    pub async fn fail_unfinished(
        pool: &PgPool,
        task_id: Uuid,
        errors: &[RowError],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
               SET status = 'FAILED',
                   completed_at = now(),
                   errors = $2,
                   worker_id = NULL,
                   processing_at = NULL,
                   updated_at = now()
             WHERE task_id = $1
               AND status IN ('PENDING', 'IN_PROGRESS')
            "#,
        )
        .bind(task_id)
        .bind(Json(errors))
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn find_by_id(pool: &PgPool, task_id: Uuid) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            SELECT task_id, file_path, original_file_name, status, errors,
                   worker_id, processing_at, started_at, completed_at,
                   created_at, updated_at
              FROM tasks
             WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
        assert_eq!(
            serde_json::from_str::<TaskStatus>("\"FAILED\"").unwrap(),
            TaskStatus::Failed
        );
    }

    #[test]
    fn test_row_error_shapes() {
        let row = RowError::at_row(12, "Invalid check_in_date");
        assert_eq!(row.row, Some(12));

        let file = RowError::file_level("Sheet is empty");
        assert_eq!(file.row, None);

        let json = serde_json::to_value(&file).unwrap();
        assert!(json["row"].is_null());
        assert_eq!(json["error"], "Sheet is empty");
    }
}
