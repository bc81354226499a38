//! Liveness endpoint.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::web::state::AppState;

/// GET /health: process liveness plus a database ping.
pub async fn liveness(State(state): State<AppState>) -> Json<serde_json::Value> {
    let database = sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .map(|_| "up")
        .unwrap_or("down");

    Json(json!({
        "status": "ok",
        "database": database,
    }))
}
