//! # Task Handlers
//!
//! Chunk upload, task status projection and the CSV error report.

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use rsvp_shared::models::task::{RowError, Task, TaskStatus};
use rsvp_shared::types::web::{ApiError, ApiResult};

use crate::upload::{ChunkOutcome, ChunkUpload};
use crate::web::state::AppState;

/// Upload one chunk: POST /v1/task/upload
///
/// multipart/form-data with `file`, `uploadId`, `originalFileName`,
/// `chunkNumber`, `totalChunks`. Intermediate chunks answer
/// `200 {"status":"chunk_received"}`; the terminal chunk answers
/// `201 {"taskId": …}`. The caller gets a task id, never a processing
/// result; completion is observed via the status endpoint.
pub async fn upload_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let mut file: Option<(Bytes, String)> = None;
    let mut upload_id: Option<String> = None;
    let mut original_file_name: Option<String> = None;
    let mut chunk_number: Option<u32> = None;
    let mut total_chunks: Option<u32> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let mime = field.content_type().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Unreadable file field: {e}")))?;
                file = Some((data, mime));
            }
            Some("uploadId") => upload_id = Some(read_text_field(field).await?),
            Some("originalFileName") => original_file_name = Some(read_text_field(field).await?),
            Some("chunkNumber") => {
                chunk_number = Some(parse_int_field(field, "chunkNumber").await?);
            }
            Some("totalChunks") => {
                total_chunks = Some(parse_int_field(field, "totalChunks").await?);
            }
            _ => {}
        }
    }

    let (data, mime_type) = file.ok_or_else(|| ApiError::bad_request("Missing field: file"))?;
    let upload_id = upload_id.ok_or_else(|| ApiError::bad_request("Missing field: uploadId"))?;
    let original_file_name =
        original_file_name.ok_or_else(|| ApiError::bad_request("Missing field: originalFileName"))?;
    let chunk_number =
        chunk_number.ok_or_else(|| ApiError::bad_request("Missing field: chunkNumber"))?;
    let total_chunks =
        total_chunks.ok_or_else(|| ApiError::bad_request("Missing field: totalChunks"))?;

    if Uuid::parse_str(&upload_id).is_err() {
        return Err(ApiError::bad_request("uploadId must be a UUID"));
    }

    let outcome = state
        .assembler
        .ingest_chunk(ChunkUpload {
            data,
            mime_type,
            upload_id,
            original_file_name,
            chunk_number,
            total_chunks,
        })
        .await
        .map_err(|e| {
            if e.is_client_error() {
                ApiError::bad_request(e.to_string())
            } else {
                error!(error = %e, "Chunk ingestion failed");
                ApiError::Internal
            }
        })?;

    Ok(match outcome {
        ChunkOutcome::Received => {
            (StatusCode::OK, Json(json!({"status": "chunk_received"}))).into_response()
        }
        ChunkOutcome::Completed { task_id } => {
            info!(task_id = %task_id, "Upload complete");
            (StatusCode::CREATED, Json(json!({"taskId": task_id}))).into_response()
        }
    })
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Unreadable form field: {e}")))
}

async fn parse_int_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> ApiResult<u32> {
    read_text_field(field)
        .await?
        .trim()
        .parse::<u32>()
        .map_err(|_| ApiError::bad_request(format!("{name} must be a non-negative integer")))
}

/// Client-facing projection of a task.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub errors: Vec<RowError>,
    pub original_file_name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Task status: GET /v1/task/status/:task_id
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskStatusResponse>> {
    let task = Task::find_by_id(&state.pool, task_id)
        .await
        .map_err(|e| {
            error!(task_id = %task_id, error = %e, "Task lookup failed");
            ApiError::database_error("task lookup")
        })?
        .ok_or_else(|| ApiError::not_found(format!("Task {task_id} not found")))?;

    Ok(Json(TaskStatusResponse {
        task_id: task.task_id,
        status: task.status,
        errors: task.errors.0,
        original_file_name: task.original_file_name,
        started_at: task.started_at,
        completed_at: task.completed_at,
        created_at: task.created_at,
        updated_at: task.updated_at,
    }))
}

/// Error report: GET /v1/task/report/:task_id
///
/// Only failed tasks have a report; anything else is a 404 so callers
/// cannot distinguish "no task" from "nothing to report".
pub async fn download_error_report(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Response> {
    let task = Task::find_by_id(&state.pool, task_id)
        .await
        .map_err(|e| {
            error!(task_id = %task_id, error = %e, "Task lookup failed");
            ApiError::database_error("task lookup")
        })?
        .filter(|t| t.status == TaskStatus::Failed)
        .ok_or_else(|| ApiError::not_found(format!("No error report for task {task_id}")))?;

    let csv = render_error_report(&task.errors.0);
    let file_name = format!(
        "error_report_{}.csv",
        sanitize_report_name(&task.original_file_name)
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        csv,
    )
        .into_response())
}

fn render_error_report(errors: &[RowError]) -> String {
    let mut csv = String::from("\"Row\",\"Error\"\n");
    for entry in errors {
        let row = entry
            .row
            .map(|r| r.to_string())
            .unwrap_or_default();
        csv.push_str(&format!(
            "{},{}\n",
            escape_csv_field(&row),
            escape_csv_field(&entry.error)
        ));
    }
    csv
}

/// Wrap in quotes and double every embedded quote.
fn escape_csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Strip the extension and everything outside the upload's allowed name
/// alphabet before the name is re-emitted in a header.
fn sanitize_report_name(original: &str) -> String {
    let stem = original.strip_suffix(".xlsx").unwrap_or(original);
    let sanitized: String = stem
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | ',' | '-' | ' '))
        .collect();

    if sanitized.trim().is_empty() {
        "report".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_csv_field_doubles_quotes() {
        assert_eq!(escape_csv_field("plain"), "\"plain\"");
        assert_eq!(
            escape_csv_field("Missing \"guest_name\""),
            "\"Missing \"\"guest_name\"\"\""
        );
        assert_eq!(escape_csv_field(""), "\"\"");
    }

    #[test]
    fn test_render_error_report() {
        let errors = vec![
            RowError::at_row(2, "Duplicate reservation_id: R-1"),
            RowError::file_level("Sheet has no data rows"),
        ];

        let csv = render_error_report(&errors);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "\"Row\",\"Error\"");
        assert_eq!(lines[1], "\"2\",\"Duplicate reservation_id: R-1\"");
        assert_eq!(lines[2], "\"\",\"Sheet has no data rows\"");
    }

    #[test]
    fn test_sanitize_report_name() {
        assert_eq!(sanitize_report_name("july bookings.xlsx"), "july bookings");
        assert_eq!(sanitize_report_name("a/b\\c.xlsx"), "abc");
        assert_eq!(sanitize_report_name("....xlsx"), "report");
    }
}
