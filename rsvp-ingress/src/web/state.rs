//! Shared state for the ingress API.

use std::sync::Arc;

use sqlx::PgPool;

use crate::upload::UploadAssembler;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub assembler: Arc<UploadAssembler>,
    pub root_api_key: Arc<String>,
}

impl AppState {
    pub fn new(pool: PgPool, assembler: Arc<UploadAssembler>, root_api_key: String) -> Self {
        Self {
            pool,
            assembler,
            root_api_key: Arc::new(root_api_key),
        }
    }
}
