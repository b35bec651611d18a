//! Face matching service client
//!
//! JSON over HTTP. Photos are sent as data URIs:
//! - `POST {base}/verify-face` `{livePhotoDataUri, enrolledFaceDataUri, studentName}`
//!   answers `{isMatch, confidence, reason}`
//! - `POST {base}/enroll-face` `{studentPhotoDataUri, studentId}`
//!   answers `{success, message}`

use crate::application::config::AttendanceConfig;
use crate::domain::services::{EnrollmentReceipt, FaceMatchService, FaceMatchVerdict};
use crate::domain::value_objects::{Photo, StudentId};
use crate::error::{AttendanceError, AttendanceResult};
use serde::Serialize;
use serde::de::DeserializeOwned;

const USER_AGENT: &str = concat!("attendance/", env!("CARGO_PKG_VERSION"));

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyFaceRequest<'a> {
    live_photo_data_uri: String,
    enrolled_face_data_uri: String,
    student_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnrollFaceRequest {
    student_photo_data_uri: String,
    student_id: String,
}

/// HTTP face matching service
#[derive(Clone)]
pub struct HttpFaceMatchService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFaceMatchService {
    pub fn new(config: &AttendanceConfig) -> AttendanceResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.face_match_timeout)
            .build()
            .map_err(|e| AttendanceError::Internal(format!("face service client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.face_service_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> AttendanceResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttendanceError::FaceService(format!(
                "{} returned status {}",
                path, status
            )));
        }

        response.json::<T>().await.map_err(map_transport_error)
    }
}

impl FaceMatchService for HttpFaceMatchService {
    async fn compare(
        &self,
        live: &Photo,
        enrolled: &Photo,
        subject_label: &str,
    ) -> AttendanceResult<FaceMatchVerdict> {
        let request = VerifyFaceRequest {
            live_photo_data_uri: live.to_data_uri(),
            enrolled_face_data_uri: enrolled.to_data_uri(),
            student_name: subject_label,
        };

        let verdict: FaceMatchVerdict = self.post("/verify-face", &request).await?;
        if !verdict.confidence.is_finite() {
            return Err(AttendanceError::FaceService(
                "confidence is not a number".to_string(),
            ));
        }

        tracing::debug!(
            live = %live.digest(),
            enrolled = %enrolled.digest(),
            is_match = verdict.is_match,
            confidence = verdict.confidence,
            "Face comparison answered"
        );
        Ok(verdict)
    }

    async fn enroll(&self, photo: &Photo, student_id: &StudentId) -> AttendanceResult<EnrollmentReceipt> {
        let request = EnrollFaceRequest {
            student_photo_data_uri: photo.to_data_uri(),
            student_id: student_id.to_string(),
        };

        self.post("/enroll-face", &request).await
    }
}

fn map_transport_error(err: reqwest::Error) -> AttendanceError {
    if err.is_timeout() {
        AttendanceError::FaceServiceTimeout
    } else if err.is_decode() {
        AttendanceError::FaceService(format!("unreadable answer: {}", err))
    } else {
        AttendanceError::FaceService(err.to_string())
    }
}
