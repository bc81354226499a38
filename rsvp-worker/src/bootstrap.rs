//! Worker wiring: store, bus, topology, dispatcher and processor startup,
//! graceful teardown.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info, warn};

use rsvp_shared::config::RsvpConfig;
use rsvp_shared::messaging::{topology, RabbitBus};
use rsvp_shared::storage;
use rsvp_shared::{Result, RsvpError};

use crate::dispatcher::OutboxDispatcher;
use crate::processor::TaskProcessor;

pub struct WorkerHandle {
    pub dispatcher: Arc<OutboxDispatcher>,
    pub processor: Arc<TaskProcessor>,
    pub bus: Arc<RabbitBus>,
    pub pool: PgPool,
    processor_task: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    /// Graceful shutdown: stop claiming, close the bus (ending the
    /// consumer stream), drain the consumer task, close the pool.
    pub async fn stop(self) {
        info!("Stopping worker");
        self.dispatcher.stop();
        self.processor.stop();

        if let Err(e) = self.bus.close().await {
            warn!(error = %e, "Bus close reported an error");
        }

        if tokio::time::timeout(Duration::from_secs(10), self.processor_task)
            .await
            .is_err()
        {
            warn!("Processor did not drain within 10s; continuing shutdown");
        }

        self.pool.close().await;
        info!("Worker stopped");
    }
}

pub async fn bootstrap(config: &RsvpConfig) -> Result<WorkerHandle> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|e| RsvpError::DatabaseError(format!("Postgres connection failed: {e}")))?;

    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .map_err(|e| RsvpError::DatabaseError(format!("Migration failed: {e}")))?;

    let bus = Arc::new(RabbitBus::connect(&config.rabbitmq).await?);
    topology::declare_topology(bus.channel(), config.processor.dlq_ttl_ms).await?;

    let storage = storage::build_store(&config.s3);
    let worker_id = rsvp_shared::worker_id();

    let dispatcher = Arc::new(OutboxDispatcher::new(
        pool.clone(),
        bus.clone(),
        config.dispatcher.clone(),
        worker_id.clone(),
    ));
    dispatcher.start();

    let processor = Arc::new(TaskProcessor::new(
        pool.clone(),
        bus.clone(),
        storage,
        config.processor.clone(),
        worker_id.clone(),
    ));

    let processor_task = {
        let processor = Arc::clone(&processor);
        tokio::spawn(async move {
            if let Err(e) = processor.run().await {
                error!(error = %e, "Processor exited with error");
            }
        })
    };

    info!(worker_id = %worker_id, "Worker bootstrapped");

    Ok(WorkerHandle {
        dispatcher,
        processor,
        bus,
        pool,
        processor_task,
    })
}
