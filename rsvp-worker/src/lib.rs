//! # rsvp-worker
//!
//! Worker fleet for the rsvp pipeline: the outbox dispatcher that drains
//! durable events into RabbitMQ, and the task processor that consumes
//! them, validates uploaded spreadsheets and upserts reservations.

pub mod bootstrap;
pub mod dispatcher;
pub mod processor;
