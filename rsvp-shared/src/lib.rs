//! # rsvp-shared
//!
//! Shared foundation of the rsvp reservation-ingestion pipeline: persistent
//! models, typed configuration, the message-bus layer (envelopes, topology,
//! RabbitMQ handle), the session cache, the object store, spreadsheet
//! decoding and logging.
//!
//! The two services (`rsvp-ingress`, `rsvp-worker`) are thin crates wiring
//! these pieces together.

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod spreadsheet;
pub mod storage;
pub mod types;

pub use error::{Result, RsvpError};

/// Stable per-process worker identity: `<host>-<pid>`.
///
/// Used as the claim owner for outbox events and tasks. Uniqueness across
/// the fleet only needs to hold while leases are live; host+pid is enough
/// and survives nothing, which is exactly what the wall-clock stale sweep
/// assumes.
pub fn worker_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
    format!("{}-{}", host, std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id_shape() {
        let id = worker_id();
        let pid = std::process::id().to_string();
        assert!(id.ends_with(&format!("-{pid}")));
        assert!(id.len() > pid.len() + 1);
    }
}
