//! Persistent models for the rsvp pipeline.

pub mod outbox_event;
pub mod reservation;
pub mod task;

pub use outbox_event::{EventError, EventStatus, OutboxEvent};
pub use reservation::{NewReservation, Reservation, ReservationStatus};
pub use task::{NewTask, RowError, Task, TaskStatus};
