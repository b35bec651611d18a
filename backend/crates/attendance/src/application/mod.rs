//! Application Layer - Use Cases
//!
//! This layer orchestrates domain logic and infrastructure.
//! Contains use case implementations.

pub mod check_in;
pub mod config;
pub mod create_session;
pub mod end_session;
pub mod enroll_face;
pub mod session_aggregator;
pub mod student_profile;
