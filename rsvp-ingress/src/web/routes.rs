//! Route definitions for the ingress API.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::middleware::require_api_key;
use super::state::AppState;

/// Upper bound for one multipart request; chunks beyond this are a client
/// error, not a reason to raise the limit.
const MAX_UPLOAD_BODY_BYTES: usize = 32 * 1024 * 1024;

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/task/upload",
            post(handlers::tasks::upload_chunk).layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES)),
        )
        .route("/task/status/:task_id", get(handlers::tasks::get_task_status))
        .route(
            "/task/report/:task_id",
            get(handlers::tasks::download_error_report),
        )
}

/// Full ingress router: authenticated `/v1` API plus the open health
/// endpoint.
pub fn build_router(state: AppState) -> Router {
    let v1 = api_v1_routes()
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .nest("/v1", v1)
        .route("/health", get(handlers::health::liveness))
        .with_state(state)
}
