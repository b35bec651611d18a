//! Attendance Router

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use crate::application::config::AttendanceConfig;
use crate::domain::repository::AttendanceStore;
use crate::domain::services::{FaceMatchService, GeofenceCheck};
use crate::infra::face_match::HttpFaceMatchService;
use crate::infra::live_feed::SessionFeedHub;
use crate::infra::postgres::PgAttendanceRepository;
use crate::presentation::handlers::{self, AttendanceAppState};

/// Create the Attendance router with PostgreSQL repository
pub fn attendance_router(
    repo: PgAttendanceRepository,
    face_match: HttpFaceMatchService,
    feed: Arc<SessionFeedHub>,
    config: AttendanceConfig,
) -> Router {
    attendance_router_generic(repo, face_match, feed, config)
}

/// Create a generic Attendance router for any store and face service
pub fn attendance_router_generic<R, F>(
    repo: R,
    face_match: F,
    feed: Arc<SessionFeedHub>,
    config: AttendanceConfig,
) -> Router
where
    R: AttendanceStore,
    F: FaceMatchService + Send + Sync + 'static,
{
    let state = AttendanceAppState {
        repo: Arc::new(repo),
        face_match: Arc::new(face_match),
        feed,
        location: Arc::new(GeofenceCheck),
        config: Arc::new(config),
    };

    Router::new()
        .route("/sessions", post(handlers::create_session::<R, F>))
        .route("/sessions/{session_id}", get(handlers::get_session::<R, F>))
        .route(
            "/sessions/{session_id}/end",
            post(handlers::end_session::<R, F>),
        )
        .route(
            "/sessions/{session_id}/live",
            get(handlers::live_session::<R, F>),
        )
        .route("/check-in", post(handlers::check_in::<R, F>))
        .route(
            "/students/{student_id}/profile",
            get(handlers::get_profile::<R, F>).put(handlers::update_profile::<R, F>),
        )
        .route(
            "/students/{student_id}/enrollment",
            post(handlers::enroll_face::<R, F>),
        )
        .route(
            "/students/{student_id}/history",
            get(handlers::history::<R, F>),
        )
        .route(
            "/entry-url/resolve",
            post(handlers::resolve_entry_url::<R, F>),
        )
        .with_state(state)
}
