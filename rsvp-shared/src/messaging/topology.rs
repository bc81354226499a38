//! # Bus Topology
//!
//! Durable exchanges, queues and bindings for the pipeline, including the
//! delayed-retry DLQ loop. Declared idempotently at worker startup.
//!
//! Retry trajectory for a transient processor failure:
//!
//! ```text
//! q.worker.task --nack(requeue=false)--> x.dlq (dlq-delay)
//!   --> q.dlq.worker-task --TTL expiry--> x.dlq (dlq-publish)
//!   --> x.worker --> q.worker.task
//! ```
//!
//! The delay queue has no consumer; its only job is to hold messages for
//! the TTL before dead-lettering them back. No retry counter is kept;
//! poison messages terminate via the processor's ack-on-unexpected-error
//! policy.

use lapin::options::{
    ExchangeBindOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};
use tracing::info;

use super::errors::MessagingError;

/// Fanout exchange every outbox event is published to.
pub const EVENTS_EXCHANGE: &str = "x.events";
/// Topic exchange routing events to worker queues.
pub const WORKER_EXCHANGE: &str = "x.worker";
/// Topic exchange driving the delayed-retry loop.
pub const DLQ_EXCHANGE: &str = "x.dlq";

/// Main task queue consumed by the processor fleet.
pub const WORKER_TASK_QUEUE: &str = "q.worker.task";
/// Consumer-less delay queue holding rejected messages for the retry TTL.
pub const DLQ_WORKER_TASK_QUEUE: &str = "q.dlq.worker-task";

/// Pattern forwarding every `*.event` routing key from `x.events` into
/// `x.worker`.
pub const EVENT_FORWARD_PATTERN: &str = "#.event";
/// Pattern selecting task events (e.g. `task.created.event`) into the task
/// queue.
pub const TASK_BINDING_PATTERN: &str = "task.*.event";
/// Routing key a delayed message re-enters the worker exchange with.
pub const DLQ_PUBLISH_KEY: &str = "dlq-publish";
/// Routing key a rejected message leaves the task queue with.
pub const DLQ_DELAY_KEY: &str = "dlq-delay";

/// Declare the full topology on the given channel.
///
/// Safe to call on every startup; RabbitMQ treats redeclaration with equal
/// parameters as a no-op.
pub async fn declare_topology(channel: &Channel, dlq_ttl_ms: u32) -> Result<(), MessagingError> {
    let durable = ExchangeDeclareOptions {
        durable: true,
        ..Default::default()
    };

    channel
        .exchange_declare(
            EVENTS_EXCHANGE,
            ExchangeKind::Fanout,
            durable,
            FieldTable::default(),
        )
        .await
        .map_err(|e| MessagingError::topology(EVENTS_EXCHANGE, e.to_string()))?;

    channel
        .exchange_declare(
            WORKER_EXCHANGE,
            ExchangeKind::Topic,
            durable,
            FieldTable::default(),
        )
        .await
        .map_err(|e| MessagingError::topology(WORKER_EXCHANGE, e.to_string()))?;

    channel
        .exchange_declare(
            DLQ_EXCHANGE,
            ExchangeKind::Topic,
            durable,
            FieldTable::default(),
        )
        .await
        .map_err(|e| MessagingError::topology(DLQ_EXCHANGE, e.to_string()))?;

    channel
        .exchange_bind(
            WORKER_EXCHANGE,
            EVENTS_EXCHANGE,
            EVENT_FORWARD_PATTERN,
            ExchangeBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| MessagingError::topology(WORKER_EXCHANGE, e.to_string()))?;

    channel
        .exchange_bind(
            WORKER_EXCHANGE,
            DLQ_EXCHANGE,
            DLQ_PUBLISH_KEY,
            ExchangeBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| MessagingError::topology(WORKER_EXCHANGE, e.to_string()))?;

    // Main task queue: rejections dead-letter into the delay loop.
    let mut task_queue_args = FieldTable::default();
    task_queue_args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(DLQ_EXCHANGE.to_string().into()),
    );
    task_queue_args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(DLQ_DELAY_KEY.to_string().into()),
    );

    channel
        .queue_declare(
            WORKER_TASK_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            task_queue_args,
        )
        .await
        .map_err(|e| MessagingError::topology(WORKER_TASK_QUEUE, e.to_string()))?;

    for routing_key in [TASK_BINDING_PATTERN, DLQ_PUBLISH_KEY] {
        channel
            .queue_bind(
                WORKER_TASK_QUEUE,
                WORKER_EXCHANGE,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::topology(WORKER_TASK_QUEUE, e.to_string()))?;
    }

    // Delay queue: expiry dead-letters back toward the task queue.
    let mut delay_queue_args = FieldTable::default();
    delay_queue_args.insert("x-message-ttl".into(), AMQPValue::LongUInt(dlq_ttl_ms));
    delay_queue_args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(DLQ_EXCHANGE.to_string().into()),
    );
    delay_queue_args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(DLQ_PUBLISH_KEY.to_string().into()),
    );

    channel
        .queue_declare(
            DLQ_WORKER_TASK_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            delay_queue_args,
        )
        .await
        .map_err(|e| MessagingError::topology(DLQ_WORKER_TASK_QUEUE, e.to_string()))?;

    channel
        .queue_bind(
            DLQ_WORKER_TASK_QUEUE,
            DLQ_EXCHANGE,
            DLQ_DELAY_KEY,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| MessagingError::topology(DLQ_WORKER_TASK_QUEUE, e.to_string()))?;

    info!(
        dlq_ttl_ms = dlq_ttl_ms,
        "Bus topology declared (exchanges, task queue, delay queue)"
    );

    Ok(())
}
