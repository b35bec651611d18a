//! Value Object Module

pub mod email;
pub mod geo;
pub mod lecture;
pub mod photo;
pub mod session_id;

pub use email::Email;
pub use geo::{GeoPoint, Geofence};
pub use lecture::{AttendanceStatus, LectureDetails};
pub use photo::Photo;
pub use session_id::SessionId;

pub use kernel::id::{ProfessorId, StudentId};
