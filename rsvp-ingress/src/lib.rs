//! # rsvp-ingress
//!
//! HTTP ingress for the rsvp pipeline: accepts chunked spreadsheet
//! uploads, assembles them into object-store artifacts, mints Task +
//! outbox Event pairs, and serves task status and CSV error reports.

pub mod bootstrap;
pub mod upload;
pub mod web;
