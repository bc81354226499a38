//! # Outbox Dispatcher
//!
//! Drains NEW outbox events into the message bus with at-least-once
//! semantics. Two periodic tasks with independent cadence:
//!
//! - `publish_new_events` (default every 1s): claim a batch, publish each
//!   claimed event in its own transaction, confirm it PUBLISHED.
//! - `recover_stale_events` (default every 2min): sweep PROCESSING claims
//!   older than the stale threshold back to NEW.
//!
//! The store is the source of truth: the dispatcher never reads bus acks
//! beyond the publisher confirm. Per-event transactions scope the effect
//! of bus failures: one slow or failing event cannot strand the rest of
//! its batch. Duplicates are possible when a publish lands but the status
//! update does not; consumers absorb them via idempotent claims.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use sqlx::PgPool;
use tracing::{debug, error, info, instrument, warn};

use rsvp_shared::config::DispatcherConfig;
use rsvp_shared::messaging::envelope::wire_body;
use rsvp_shared::messaging::topology::EVENTS_EXCHANGE;
use rsvp_shared::messaging::RabbitBus;
use rsvp_shared::models::outbox_event::OutboxEvent;
use rsvp_shared::{Result, RsvpError};

/// Runtime counters, for logs and tests.
#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub publish_ticks: AtomicU64,
    pub events_published: AtomicU64,
    pub events_recovered: AtomicU64,
    pub lost_claims: AtomicU64,
    pub publish_errors: AtomicU64,
}

#[derive(Clone)]
pub struct OutboxDispatcher {
    pool: PgPool,
    bus: Arc<RabbitBus>,
    config: DispatcherConfig,
    worker_id: String,
    is_running: Arc<AtomicBool>,
    stats: Arc<DispatcherStats>,
}

impl OutboxDispatcher {
    pub fn new(
        pool: PgPool,
        bus: Arc<RabbitBus>,
        config: DispatcherConfig,
        worker_id: String,
    ) -> Self {
        Self {
            pool,
            bus,
            config,
            worker_id,
            is_running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(DispatcherStats::default()),
        }
    }

    pub fn stats(&self) -> &DispatcherStats {
        &self.stats
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Spawn the two periodic tasks. Idempotent per instance.
    pub fn start(&self) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(
            worker_id = %self.worker_id,
            publish_interval = ?self.config.publish_interval(),
            recover_interval = ?self.config.recover_interval(),
            batch_size = self.config.batch_size,
            "Starting outbox dispatcher"
        );

        let publisher = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(publisher.config.publish_interval());
            while publisher.is_running.load(Ordering::SeqCst) {
                interval.tick().await;
                publisher.stats.publish_ticks.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = publisher.publish_new_events().await {
                    // A bad tick never stops the loop.
                    error!(error = %e, "Publish tick failed");
                }
            }
            info!("Outbox publish loop stopped");
        });

        let recoverer = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(recoverer.config.recover_interval());
            while recoverer.is_running.load(Ordering::SeqCst) {
                interval.tick().await;
                if let Err(e) = recoverer.recover_stale_events().await {
                    error!(error = %e, "Recovery tick failed");
                }
            }
            info!("Outbox recovery loop stopped");
        });
    }

    /// Stop claiming new work. In-flight publishes finish on their own.
    pub fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }

    /// One publish tick: claim NEW events oldest-first, then publish and
    /// confirm each one in its own transaction.
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn publish_new_events(&self) -> Result<u64> {
        let claimed =
            OutboxEvent::claim_batch(&self.pool, &self.worker_id, self.config.batch_size).await?;

        if claimed > 0 {
            debug!(claimed = claimed, "Claimed outbox events");
        }

        // Read back everything held under this identity, not just this
        // tick's claims: events stranded by an earlier failed publish get
        // another attempt before the stale sweep would reclaim them.
        let events = OutboxEvent::fetch_claimed(&self.pool, &self.worker_id).await?;
        if events.is_empty() {
            return Ok(0);
        }

        let mut published = 0u64;
        for event in &events {
            match self.publish_one(event).await {
                Ok(true) => published += 1,
                Ok(false) => {
                    self.stats.lost_claims.fetch_add(1, Ordering::Relaxed);
                    warn!(event_id = %event.id, "Lost claim during publish (recovery interleaved)");
                }
                Err(e) => {
                    self.stats.publish_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        event_id = %event.id,
                        event_name = %event.event_name,
                        error = %e,
                        "Publish failed; event stays claimed until recovery"
                    );
                }
            }
        }

        if published > 0 {
            self.stats
                .events_published
                .fetch_add(published, Ordering::Relaxed);
            info!(published = published, "Outbox events published");
        }

        Ok(published)
    }

    /// Publish one event and flip it to PUBLISHED, atomically with respect
    /// to concurrent recovery. Returns `Ok(false)` when the claim was lost
    /// and the transaction rolled back.
    async fn publish_one(&self, event: &OutboxEvent) -> Result<bool> {
        let body = serde_json::to_vec(&wire_body(event.id, &event.event))?;

        let mut tx = self.pool.begin().await.map_err(RsvpError::from)?;

        self.bus
            .publish(EVENTS_EXCHANGE, &event.event_name, &body)
            .await?;

        let matched = OutboxEvent::confirm_published(&mut *tx, event.id, &self.worker_id).await?;
        if matched == 0 {
            tx.rollback().await.map_err(RsvpError::from)?;
            return Ok(false);
        }

        tx.commit().await.map_err(RsvpError::from)?;
        Ok(true)
    }

    /// One recovery tick: sweep abandoned claims back to NEW.
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn recover_stale_events(&self) -> Result<u64> {
        let recovered =
            OutboxEvent::recover_stale(&self.pool, self.config.stale_threshold_seconds).await?;

        if recovered > 0 {
            self.stats
                .events_recovered
                .fetch_add(recovered, Ordering::Relaxed);
            info!(
                recovered = recovered,
                stale_threshold_seconds = self.config.stale_threshold_seconds,
                "Recovered stale outbox events"
            );
        }

        Ok(recovered)
    }
}
