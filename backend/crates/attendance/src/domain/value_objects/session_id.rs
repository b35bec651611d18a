//! Session Identifier Value Object
//!
//! Opaque string id carried in the QR entry link. New ids are Nanoids,
//! but any reasonable caller-supplied id is accepted when parsing.

use kernel::error::app_error::{AppError, AppResult};
use nid::Nanoid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum accepted id length
const SESSION_ID_MAX_LENGTH: usize = 64;

/// Attendance session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh collision-resistant id
    pub fn generate() -> Self {
        let id: Nanoid = Nanoid::new();
        Self(id.as_str().to_string())
    }

    /// Parse a caller-supplied id
    pub fn parse(raw: &str) -> AppResult<Self> {
        let raw = raw.trim();

        if raw.is_empty() {
            return Err(AppError::bad_request("Session id cannot be empty"));
        }

        if raw.len() > SESSION_ID_MAX_LENGTH {
            return Err(AppError::bad_request(format!(
                "Session id must be at most {} characters",
                SESSION_ID_MAX_LENGTH
            )));
        }

        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(AppError::bad_request("Session id contains invalid characters"));
        }

        Ok(Self(raw.to_string()))
    }

    /// Create from database value (assumed already validated)
    pub fn from_db(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionId {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        SessionId::parse(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = AppError;

    fn try_from(value: String) -> AppResult<Self> {
        SessionId::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
