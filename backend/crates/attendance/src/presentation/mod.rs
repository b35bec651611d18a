//! Presentation Layer - HTTP interface
//!
//! - `dto` - request and response bodies
//! - `handlers` - axum handlers and shared state
//! - `router` - route table

pub mod dto;
pub mod handlers;
pub mod router;
