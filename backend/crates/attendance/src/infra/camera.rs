//! Camera backed by an uploaded frame
//!
//! Over HTTP the browser owns the real camera and sends the captured
//! frame with the check-in request. This adapter lets the state machine
//! drive that frame through the same acquire/capture/release steps.

use crate::domain::services::{Camera, CameraStream, DeviceError};
use crate::domain::value_objects::Photo;

/// Camera that yields one pre-captured frame
#[derive(Debug, Clone)]
pub struct UploadedFrameCamera {
    frame: Option<Photo>,
}

impl UploadedFrameCamera {
    pub fn new(frame: Option<Photo>) -> Self {
        Self { frame }
    }
}

impl Camera for UploadedFrameCamera {
    async fn acquire(&self) -> Result<Box<dyn CameraStream>, DeviceError> {
        match &self.frame {
            Some(frame) => Ok(Box::new(UploadedFrameStream {
                frame: Some(frame.clone()),
            })),
            None => Err(DeviceError::Unavailable(
                "no frame was sent with the request".to_string(),
            )),
        }
    }
}

struct UploadedFrameStream {
    frame: Option<Photo>,
}

impl CameraStream for UploadedFrameStream {
    fn capture_frame(&mut self) -> Result<Photo, DeviceError> {
        self.frame.take().ok_or(DeviceError::NoFrame)
    }

    fn release(&mut self) {
        self.frame = None;
    }
}
