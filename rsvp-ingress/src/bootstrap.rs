//! Ingress wiring: configuration, connections, migrations, router.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use rsvp_shared::cache::{CacheService, RedisCacheService};
use rsvp_shared::config::RsvpConfig;
use rsvp_shared::storage;
use rsvp_shared::{Result, RsvpError};

use crate::upload::UploadAssembler;
use crate::web::{build_router, AppState};

pub struct IngressHandle {
    pub router: axum::Router,
    pub bind_address: String,
    pub pool: PgPool,
    pub cache: Arc<dyn CacheService>,
}

impl IngressHandle {
    /// Close connections after the server has drained.
    pub async fn stop(&self) {
        self.pool.close().await;
        info!("Ingress connections closed");
    }
}

/// Build every handle the ingress needs and assemble the router.
pub async fn bootstrap(config: &RsvpConfig) -> Result<IngressHandle> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|e| RsvpError::DatabaseError(format!("Postgres connection failed: {e}")))?;

    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .map_err(|e| RsvpError::DatabaseError(format!("Migration failed: {e}")))?;

    let cache: Arc<dyn CacheService> = Arc::new(RedisCacheService::from_config(&config.redis).await?);
    let storage = storage::build_store(&config.s3);

    let assembler = Arc::new(UploadAssembler::new(
        pool.clone(),
        cache.clone(),
        storage,
        config.upload.session_ttl(),
    ));

    let state = AppState::new(pool.clone(), assembler, config.auth.root_api_key.clone());

    info!(
        environment = config.environment(),
        bind = %config.api.bind_address(),
        "Ingress bootstrapped"
    );

    Ok(IngressHandle {
        router: build_router(state),
        bind_address: config.api.bind_address(),
        pool,
        cache,
    })
}
