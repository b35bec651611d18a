//! Capability Traits
//!
//! External collaborators the check-in flow depends on. Production
//! implementations live in the infra layer, tests substitute fakes.

use crate::domain::value_objects::{GeoPoint, Geofence, Photo, StudentId};
use crate::error::AttendanceResult;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Answer of the face matching service for one comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceMatchVerdict {
    pub is_match: bool,
    /// 0.0 ..= 1.0
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
}

/// Answer of the face matching service for an enrollment photo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentReceipt {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// Face matching service
#[trait_variant::make(FaceMatchService: Send)]
pub trait LocalFaceMatchService {
    /// Compare a live photo against the enrolled reference
    async fn compare(
        &self,
        live: &Photo,
        enrolled: &Photo,
        subject_label: &str,
    ) -> AttendanceResult<FaceMatchVerdict>;

    /// Check that a photo is usable as an enrollment reference
    async fn enroll(&self, photo: &Photo, student_id: &StudentId)
    -> AttendanceResult<EnrollmentReceipt>;
}

/// Location check outcome
#[derive(Debug, Clone, PartialEq)]
pub enum LocationVerdict {
    Allowed,
    Denied { reason: String },
}

/// Decides whether a device position may check into a session
#[trait_variant::make(LocationCheck: Send)]
pub trait LocalLocationCheck {
    async fn check(&self, position: Option<&GeoPoint>, geofence: Option<&Geofence>)
    -> LocationVerdict;
}

/// Haversine radius check
///
/// Sessions without a geofence accept any position.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeofenceCheck;

impl LocationCheck for GeofenceCheck {
    async fn check(
        &self,
        position: Option<&GeoPoint>,
        geofence: Option<&Geofence>,
    ) -> LocationVerdict {
        let Some(fence) = geofence else {
            return LocationVerdict::Allowed;
        };
        let Some(position) = position else {
            return LocationVerdict::Denied {
                reason: "Device location is required for this session".to_string(),
            };
        };

        let distance = fence.center.distance_m(position);
        if distance <= fence.radius_m {
            LocationVerdict::Allowed
        } else {
            LocationVerdict::Denied {
                reason: format!(
                    "You are {:.0} m from the lecture hall (allowed {:.0} m)",
                    distance, fence.radius_m
                ),
            }
        }
    }
}

/// Camera failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera unavailable: {0}")]
    Unavailable(String),

    #[error("No frame captured")]
    NoFrame,
}

/// An acquired camera stream
pub trait CameraStream: Send {
    /// Grab one still frame
    fn capture_frame(&mut self) -> Result<Photo, DeviceError>;

    /// Stop the stream. Calling it twice is harmless.
    fn release(&mut self);
}

/// Camera device
#[trait_variant::make(Camera: Send)]
pub trait LocalCamera {
    async fn acquire(&self) -> Result<Box<dyn CameraStream>, DeviceError>;
}

/// Camera stream that is released when dropped
pub struct ActiveCamera {
    stream: Box<dyn CameraStream>,
    released: bool,
}

impl ActiveCamera {
    pub fn new(stream: Box<dyn CameraStream>) -> Self {
        Self {
            stream,
            released: false,
        }
    }

    /// Capture exactly one frame, then release the device
    pub fn capture_and_release(mut self) -> Result<Photo, DeviceError> {
        let frame = self.stream.capture_frame();
        self.release();
        frame
    }

    fn release(&mut self) {
        if !self.released {
            self.stream.release();
            self.released = true;
            tracing::debug!("Camera released");
        }
    }
}

impl Drop for ActiveCamera {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ActiveCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveCamera")
            .field("released", &self.released)
            .finish()
    }
}
