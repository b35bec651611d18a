//! HTTP Handlers

use crate::application::check_in::{CheckInContext, CheckInStateMachine};
use crate::application::config::AttendanceConfig;
use crate::application::create_session::{CreateSessionInput, CreateSessionUseCase};
use crate::application::end_session::EndSessionUseCase;
use crate::application::enroll_face::EnrollFaceUseCase;
use crate::application::session_aggregator::{SessionAggregator, SessionView};
use crate::application::student_profile::{StudentProfileUseCase, UpdateProfileInput};
use crate::domain::entry_url::parse_entry_url;
use crate::domain::repository::{AttendanceStore, SessionRepository};
use crate::domain::services::{FaceMatchService, GeofenceCheck};
use crate::domain::value_objects::{Email, Photo, SessionId, StudentId};
use crate::error::{AttendanceError, AttendanceResult};
use crate::infra::camera::UploadedFrameCamera;
use crate::infra::live_feed::SessionFeedHub;
use crate::presentation::dto::{
    CheckInRequest, CheckInResponse, CreateSessionRequest, CreateSessionResponse,
    EndSessionRequest, EndSessionResponse, EnrollmentRequest, EnrollmentResponse, HistoryResponse,
    ProfileResponse, ResolveEntryUrlRequest, ResolveEntryUrlResponse, UpdateProfileRequest,
};
use axum::Json;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use platform::client::ClientContext;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Shared state for attendance handlers
pub struct AttendanceAppState<R, F>
where
    R: AttendanceStore,
    F: FaceMatchService + Send + Sync + 'static,
{
    pub repo: Arc<R>,
    pub face_match: Arc<F>,
    pub feed: Arc<SessionFeedHub>,
    pub location: Arc<GeofenceCheck>,
    pub config: Arc<AttendanceConfig>,
}

impl<R, F> Clone for AttendanceAppState<R, F>
where
    R: AttendanceStore,
    F: FaceMatchService + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            face_match: self.face_match.clone(),
            feed: self.feed.clone(),
            location: self.location.clone(),
            config: self.config.clone(),
        }
    }
}

/// POST /api/attendance/sessions
pub async fn create_session<R, F>(
    State(state): State<AttendanceAppState<R, F>>,
    Json(req): Json<CreateSessionRequest>,
) -> AttendanceResult<(StatusCode, Json<CreateSessionResponse>)>
where
    R: AttendanceStore,
    F: FaceMatchService + Send + Sync + 'static,
{
    let geofence = req.geofence.map(|g| g.into_geofence()).transpose()?;

    let use_case = CreateSessionUseCase::new(state.repo.clone(), state.config.clone());
    let output = use_case
        .execute(CreateSessionInput {
            professor_id: req.professor_id,
            details: req.details(),
            geofence,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: output.session.id,
            entry_url: output.entry_url,
            details: output.session.details,
            active: output.session.active,
            created_at: output.session.created_at,
        }),
    ))
}

/// GET /api/attendance/sessions/{session_id}
pub async fn get_session<R, F>(
    State(state): State<AttendanceAppState<R, F>>,
    Path(session_id): Path<String>,
) -> AttendanceResult<Json<SessionView>>
where
    R: AttendanceStore,
    F: FaceMatchService + Send + Sync + 'static,
{
    let session_id = SessionId::parse(&session_id)?;
    let aggregator = SessionAggregator::new(state.repo.clone(), state.feed.clone());
    Ok(Json(aggregator.snapshot(&session_id).await?))
}

/// POST /api/attendance/sessions/{session_id}/end
pub async fn end_session<R, F>(
    State(state): State<AttendanceAppState<R, F>>,
    Path(session_id): Path<String>,
    Json(req): Json<EndSessionRequest>,
) -> AttendanceResult<Json<EndSessionResponse>>
where
    R: AttendanceStore,
    F: FaceMatchService + Send + Sync + 'static,
{
    let session_id = SessionId::parse(&session_id)?;

    let use_case = EndSessionUseCase::new(state.repo.clone());
    let output = use_case.execute(session_id, req.professor_id).await?;

    Ok(Json(EndSessionResponse {
        session_id: output.session_id,
        active: false,
        ended_at: output.ended_at,
        changed: output.changed,
    }))
}

/// GET /api/attendance/sessions/{session_id}/live
///
/// Server-Sent Events: one `session` event with the current view, then one
/// per change. The stream ends after the session has ended.
pub async fn live_session<R, F>(
    State(state): State<AttendanceAppState<R, F>>,
    Path(session_id): Path<String>,
) -> AttendanceResult<Sse<impl Stream<Item = Result<Event, Infallible>>>>
where
    R: AttendanceStore,
    F: FaceMatchService + Send + Sync + 'static,
{
    let session_id = SessionId::parse(&session_id)?;
    let aggregator = SessionAggregator::new(state.repo.clone(), state.feed.clone());
    let live = aggregator.watch(&session_id).await?;

    tracing::info!(
        session_id = %session_id,
        viewers = state.feed.subscriber_count(&session_id),
        "Live session viewer connected"
    );

    let initial = view_event(live.view());
    let updates = stream::unfold(Some(live), |live| async move {
        let mut live = live?;
        if !live.view().active {
            return None;
        }

        let next = match live.changed().await {
            Ok(Some(view)) => Some(view_event(view)),
            Ok(None) => None,
            Err(e) => {
                e.log();
                None
            }
        };
        next.map(|event| (event, Some(live)))
    });

    let events = stream::once(async move { initial })
        .chain(updates)
        .map(Ok::<_, Infallible>);

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

fn view_event(view: &SessionView) -> Event {
    Event::default()
        .event("session")
        .json_data(view)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to encode session view");
            Event::default().event("error").data("encoding failed")
        })
}

/// POST /api/attendance/check-in
///
/// Runs one full attempt with the uploaded frame standing in for the camera.
pub async fn check_in<R, F>(
    State(state): State<AttendanceAppState<R, F>>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<CheckInRequest>,
) -> AttendanceResult<Json<CheckInResponse>>
where
    R: AttendanceStore,
    F: FaceMatchService + Send + Sync + 'static,
{
    let client = ClientContext::from_headers(&headers, Some(addr.ip()));
    let session_id = SessionId::parse(&req.session_id)?;
    let position = req.position.map(|p| p.into_point()).transpose()?;
    let frame = req
        .photo_data_uri
        .as_deref()
        .map(Photo::from_data_uri)
        .transpose()?;

    let profile = StudentProfileUseCase::new(state.repo.clone())
        .get(&req.student_id)
        .await?;

    tracing::info!(
        session_id = %session_id,
        student_id = %req.student_id,
        client_ip = %client.ip_display(),
        user_agent = client.user_agent_digest.as_deref().unwrap_or("-"),
        has_position = position.is_some(),
        "Check-in attempt"
    );

    let mut machine = CheckInStateMachine::new(
        state.repo.clone(),
        state.face_match.clone(),
        state.location.clone(),
        Arc::new(UploadedFrameCamera::new(frame)),
        state.config.clone(),
        CheckInContext {
            session_id,
            student: profile,
            position,
        },
    );
    let final_state = machine.run().await?;

    Ok(Json(CheckInResponse::from_attempt(
        &final_state,
        machine.trace(),
    )))
}

/// GET /api/attendance/students/{student_id}/profile
pub async fn get_profile<R, F>(
    State(state): State<AttendanceAppState<R, F>>,
    Path(student_id): Path<String>,
) -> AttendanceResult<Json<ProfileResponse>>
where
    R: AttendanceStore,
    F: FaceMatchService + Send + Sync + 'static,
{
    let student_id = parse_student_id(&student_id)?;
    let profile = StudentProfileUseCase::new(state.repo.clone())
        .get(&student_id)
        .await?;
    Ok(Json(ProfileResponse::from(&profile)))
}

/// PUT /api/attendance/students/{student_id}/profile
pub async fn update_profile<R, F>(
    State(state): State<AttendanceAppState<R, F>>,
    Path(student_id): Path<String>,
    Json(req): Json<UpdateProfileRequest>,
) -> AttendanceResult<Json<ProfileResponse>>
where
    R: AttendanceStore,
    F: FaceMatchService + Send + Sync + 'static,
{
    let student_id = parse_student_id(&student_id)?;
    let email = Email::new(req.email)?;

    let profile = StudentProfileUseCase::new(state.repo.clone())
        .update(UpdateProfileInput {
            student_id,
            email,
            display_name: req.display_name,
            roll_no: req.roll_no,
        })
        .await?;

    Ok(Json(ProfileResponse::from(&profile)))
}

/// POST /api/attendance/students/{student_id}/enrollment
pub async fn enroll_face<R, F>(
    State(state): State<AttendanceAppState<R, F>>,
    Path(student_id): Path<String>,
    Json(req): Json<EnrollmentRequest>,
) -> AttendanceResult<Json<EnrollmentResponse>>
where
    R: AttendanceStore,
    F: FaceMatchService + Send + Sync + 'static,
{
    let student_id = parse_student_id(&student_id)?;
    let photo = Photo::from_data_uri(&req.photo_data_uri)?;

    let use_case = EnrollFaceUseCase::new(
        state.repo.clone(),
        state.face_match.clone(),
        state.config.clone(),
    );
    let output = use_case.execute(student_id, photo).await?;

    Ok(Json(EnrollmentResponse {
        student_id: output.student_id,
        enrolled_at: output.enrolled_at,
        message: output.message,
    }))
}

/// GET /api/attendance/students/{student_id}/history
pub async fn history<R, F>(
    State(state): State<AttendanceAppState<R, F>>,
    Path(student_id): Path<String>,
) -> AttendanceResult<Json<HistoryResponse>>
where
    R: AttendanceStore,
    F: FaceMatchService + Send + Sync + 'static,
{
    let student_id = parse_student_id(&student_id)?;
    let entries = StudentProfileUseCase::new(state.repo.clone())
        .history(&student_id)
        .await?;

    Ok(Json(HistoryResponse {
        student_id,
        entries,
    }))
}

/// POST /api/attendance/entry-url/resolve
pub async fn resolve_entry_url<R, F>(
    State(state): State<AttendanceAppState<R, F>>,
    Json(req): Json<ResolveEntryUrlRequest>,
) -> AttendanceResult<Json<ResolveEntryUrlResponse>>
where
    R: AttendanceStore,
    F: FaceMatchService + Send + Sync + 'static,
{
    let session_id = parse_entry_url(&req.text)?;
    let session = state
        .repo
        .find_session(&session_id)
        .await?
        .ok_or(AttendanceError::SessionNotFound)?;

    Ok(Json(ResolveEntryUrlResponse {
        session_id: session.id,
        subject: session.details.subject,
        active: session.active,
    }))
}

fn parse_student_id(raw: &str) -> AttendanceResult<StudentId> {
    raw.trim()
        .parse()
        .map_err(|_| AttendanceError::Validation("Invalid student id".to_string()))
}
