//! Application Configuration
//!
//! Configuration for the attendance application layer.

use std::time::Duration;

/// Attendance application configuration
#[derive(Debug, Clone)]
pub struct AttendanceConfig {
    /// Origin the QR entry links point at
    pub public_base_url: String,
    /// Base URL of the face matching service
    pub face_service_url: String,
    /// Upper bound for one face comparison or enrollment call
    pub face_match_timeout: Duration,
    /// Upper bound for the location check; expiry counts as a denial
    pub location_timeout: Duration,
    /// Upper bound for acquiring the camera
    pub camera_timeout: Duration,
    /// Buffered changes per live session channel
    pub live_feed_capacity: usize,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            public_base_url: "https://attend.example.edu".to_string(),
            face_service_url: "http://127.0.0.1:9400".to_string(),
            face_match_timeout: Duration::from_secs(10),
            location_timeout: Duration::from_secs(5),
            camera_timeout: Duration::from_secs(10),
            live_feed_capacity: 64,
        }
    }
}

impl AttendanceConfig {
    /// Create config for development (local frontend)
    pub fn development() -> Self {
        Self {
            public_base_url: "http://localhost:3000".to_string(),
            ..Default::default()
        }
    }

    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = url.into();
        self
    }

    pub fn with_face_service_url(mut self, url: impl Into<String>) -> Self {
        self.face_service_url = url.into();
        self
    }

    pub fn with_face_match_timeout(mut self, timeout: Duration) -> Self {
        self.face_match_timeout = timeout;
        self
    }
}
