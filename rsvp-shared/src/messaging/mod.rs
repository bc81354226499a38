//! Message-bus layer: envelopes, topology and the RabbitMQ handle.

pub mod bus;
pub mod envelope;
pub mod errors;
pub mod topology;

pub use bus::RabbitBus;
pub use envelope::{
    EventEnvelope, MessageRejection, TaskCreatedPayload, TaskEventMessage, TASK_CREATED_EVENT,
};
pub use errors::MessagingError;
