//! API-key authentication middleware.
//!
//! Every `/v1` request must carry the root API key in `x-api-key`. The
//! health endpoint stays outside this layer.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use rsvp_shared::types::web::ApiError;

use super::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok());

    match presented {
        Some(key) if key == state.root_api_key.as_str() => Ok(next.run(request).await),
        Some(_) => {
            warn!("Rejected request with invalid API key");
            Err(ApiError::Unauthorized)
        }
        None => Err(ApiError::Unauthorized),
    }
}
