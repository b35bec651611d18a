//! Infrastructure Layer
//!
//! - `postgres` - ledger, sessions and profiles on PostgreSQL
//! - `notify` - bridge from `pg_notify` to the live feed hub
//! - `live_feed` - per-session broadcast channels
//! - `memory` - in-process store implementing the same traits
//! - `face_match` - HTTP client for the face matching service
//! - `camera` - camera backed by an uploaded frame

pub mod camera;
pub mod face_match;
pub mod live_feed;
pub mod memory;
pub mod notify;
pub mod postgres;
