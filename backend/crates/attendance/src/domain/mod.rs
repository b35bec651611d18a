//! Domain Layer - Business logic and entities
//!
//! This layer contains:
//! - Domain entities (LectureSession, CheckInRecord, StudentProfile)
//! - Domain value objects (SessionId, GeoPoint, Photo)
//! - Check-in states and failure reasons
//! - Session change events and the feed trait
//! - Repository and capability traits (interfaces)

pub mod check_in;
pub mod entities;
pub mod entry_url;
pub mod events;
pub mod repository;
pub mod services;
pub mod value_objects;
