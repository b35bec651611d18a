//! Platform Crate - Technical Infrastructure
//!
//! Shared technical helpers with no attendance vocabulary:
//! - Digest and encoding utilities (SHA-256, Base64, short hex digests)
//! - Client identification from HTTP headers

pub mod client;
pub mod crypto;
