//! Session entry links
//!
//! The QR code shown in the lecture hall encodes
//! `<public base>/attend?sessionId=<id>`. Students scan it and the
//! decoded text is resolved back to a session id.

use crate::domain::value_objects::SessionId;
use kernel::error::app_error::{AppError, AppResult, OptionExt, ResultExt};
use kernel::error::kind::ErrorKind;
use url::Url;

/// Path of the student check-in page
pub const ENTRY_PATH: &str = "/attend";

/// Query parameter carrying the session id
pub const SESSION_PARAM: &str = "sessionId";

/// Base used to resolve relative links such as `/attend?sessionId=x`
const RELATIVE_BASE: &str = "http://entry.invalid";

/// Build the entry link for a session
pub fn entry_url(public_base_url: &str, session_id: &SessionId) -> AppResult<String> {
    let base = Url::parse(public_base_url)
        .map_app_err(ErrorKind::InternalServerError, "Public base URL is invalid")?;

    let mut url = base
        .join(ENTRY_PATH)
        .map_app_err(ErrorKind::InternalServerError, "Public base URL is invalid")?;
    url.query_pairs_mut()
        .clear()
        .append_pair(SESSION_PARAM, session_id.as_str());

    Ok(url.to_string())
}

/// Resolve decoded QR text to a session id
///
/// Accepts absolute links and links relative to the site root. Anything not
/// pointing at the entry page is rejected.
pub fn parse_entry_url(text: &str) -> AppResult<SessionId> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::bad_request("QR code is empty"));
    }

    let url = match Url::parse(text) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(RELATIVE_BASE)
            .and_then(|base| base.join(text))
            .map_app_err(ErrorKind::BadRequest, "QR code is not a link")?,
        Err(e) => {
            return Err(AppError::bad_request("QR code is not a link").with_source(e));
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::bad_request("QR code is not a web link"));
    }

    if url.path().trim_end_matches('/') != ENTRY_PATH {
        return Err(AppError::bad_request("QR code is not an attendance link"));
    }

    let raw = url
        .query_pairs()
        .find(|(key, _)| key == SESSION_PARAM)
        .map(|(_, value)| value.into_owned())
        .ok_or_bad_request("Attendance link has no session id")?;

    SessionId::parse(&raw)
}
