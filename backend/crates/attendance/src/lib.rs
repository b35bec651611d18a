//! Attendance Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Check-in state, entities, repository and capability traits
//! - `application/` - Use cases (check-in state machine, sessions, enrollment)
//! - `infra/` - PostgreSQL, in-memory store, live feed hub, face service client
//! - `presentation/` - HTTP handlers and SSE stream
//!
//! ## Consistency Model
//! - A check-in is recorded at most once per (session, student)
//! - A session only ever goes from active to ended
//! - The ledger write reads the active flag in the same statement, so a
//!   check-in racing the end of a session is rejected rather than recorded
//! - Live views are derived from one change feed per session

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::config::AttendanceConfig;
pub use error::{AttendanceError, AttendanceResult};
pub use infra::face_match::HttpFaceMatchService;
pub use infra::live_feed::SessionFeedHub;
pub use infra::memory::InMemoryAttendanceStore;
pub use infra::notify::spawn_change_listener;
pub use infra::postgres::PgAttendanceRepository;
pub use presentation::router::attendance_router;

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

#[cfg(test)]
mod tests;
