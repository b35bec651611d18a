//! Photo Value Object
//!
//! Still images travel as data URIs (`data:image/jpeg;base64,...`) between
//! the browser, this service and the face matching service.

use kernel::error::app_error::{AppError, AppResult, ResultExt};
use kernel::error::kind::ErrorKind;
use platform::crypto::{from_base64, short_digest, to_base64};

/// Largest accepted decoded image
const PHOTO_MAX_BYTES: usize = 5 * 1024 * 1024;

/// A decoded still image
#[derive(Clone, PartialEq, Eq)]
pub struct Photo {
    mime: String,
    bytes: Vec<u8>,
}

impl Photo {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> AppResult<Self> {
        let mime = mime.into().to_ascii_lowercase();

        if !mime.starts_with("image/") {
            return Err(AppError::bad_request("Photo must be an image"));
        }
        if bytes.is_empty() {
            return Err(AppError::bad_request("Photo is empty"));
        }
        if bytes.len() > PHOTO_MAX_BYTES {
            return Err(AppError::bad_request("Photo is too large"));
        }

        Ok(Self { mime, bytes })
    }

    /// Parse a base64 data URI
    pub fn from_data_uri(uri: &str) -> AppResult<Self> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| AppError::bad_request("Photo must be a data URI"))?;

        let (mime, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| AppError::bad_request("Photo data URI must be base64 encoded"))?;

        let bytes = from_base64(payload).map_app_err(ErrorKind::BadRequest, "Photo is not valid base64")?;

        Photo::new(mime, bytes)
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, to_base64(&self.bytes))
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Digest used to refer to the photo in logs
    pub fn digest(&self) -> String {
        short_digest(&self.bytes)
    }
}

// Image bytes never end up in logs
impl std::fmt::Debug for Photo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Photo")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .field("digest", &self.digest())
            .finish()
    }
}
