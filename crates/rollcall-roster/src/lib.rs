//! rollcall-roster: who is enrolled, and who has been seen.
//!
//! Holds the enrollment store (one reference image and one embedding per
//! identity), the append-only attendance log, and the service that ties
//! them to an [`EmbeddingProvider`](rollcall_core::EmbeddingProvider).

pub mod attendance;
pub mod error;
pub mod service;
pub mod store;

#[cfg(test)]
mod testing;

pub use attendance::{AttendanceEvent, AttendanceRecorder};
pub use error::RosterError;
pub use service::{AttendanceService, ServiceConfig, Verification};
pub use store::{EnrollmentStore, ReloadReport};
