//! Digest and encoding utilities

use base64::{Engine, engine::general_purpose};
use sha2::{Digest, Sha256};

/// Number of digest bytes kept by [`short_digest`]
const SHORT_DIGEST_LEN: usize = 8;

/// Compute SHA-256 hash
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hex encoded prefix of the SHA-256 hash
///
/// Identifies binary payloads (photos, user agents) in logs without
/// writing the payload itself.
pub fn short_digest(data: &[u8]) -> String {
    hex::encode(&sha256(data)[..SHORT_DIGEST_LEN])
}

/// Encode bytes as base64
pub fn to_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Decode base64 to bytes
///
/// Surrounding whitespace is ignored. Data URIs copied from browsers
/// sometimes carry a trailing newline.
pub fn from_base64(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::STANDARD.decode(s.trim())
}
