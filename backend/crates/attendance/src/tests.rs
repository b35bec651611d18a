//! Scenario tests for the attendance crate
//! Check-in flow, ledger idempotence, live aggregation and HTTP routes

#[cfg(test)]
mod fixtures {
    use crate::application::config::AttendanceConfig;
    use crate::domain::entities::{
        AttendanceHistoryEntry, CheckInRecord, EnrolledFace, LectureSession, StudentProfile,
    };
    use crate::domain::repository::{
        AppendCheckIn, AttendanceLedger, SessionRepository, StudentProfileRepository,
    };
    use crate::domain::services::{
        Camera, CameraStream, DeviceError, EnrollmentReceipt, FaceMatchService, FaceMatchVerdict,
    };
    use crate::domain::value_objects::{
        Email, LectureDetails, Photo, ProfessorId, SessionId, StudentId,
    };
    use crate::error::{AttendanceError, AttendanceResult};
    use crate::infra::live_feed::SessionFeedHub;
    use crate::infra::memory::InMemoryAttendanceStore;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub fn details() -> LectureDetails {
        LectureDetails {
            department: "Computer Engineering".to_string(),
            year: "TE".to_string(),
            division: "A".to_string(),
            subject: "Operating Systems".to_string(),
            lecture_date: "2026-10-12".to_string(),
            lecture_time: "10:00".to_string(),
        }
    }

    pub fn photo(tag: u8) -> Photo {
        Photo::new("image/jpeg", vec![0xff, 0xd8, tag]).unwrap()
    }

    pub fn store() -> Arc<InMemoryAttendanceStore> {
        Arc::new(InMemoryAttendanceStore::new(Arc::new(SessionFeedHub::new(64))))
    }

    pub fn config() -> Arc<AttendanceConfig> {
        Arc::new(
            AttendanceConfig::default().with_face_match_timeout(Duration::from_millis(200)),
        )
    }

    pub async fn open_session(store: &InMemoryAttendanceStore) -> LectureSession {
        let session = LectureSession::open(ProfessorId::new(), details(), None);
        store.create_session(&session).await.unwrap();
        session
    }

    pub async fn enrolled_student(store: &InMemoryAttendanceStore, email: &str) -> StudentProfile {
        let mut profile = StudentProfile::new(StudentId::new(), Email::new(email).unwrap());
        profile.display_name = Some("Asha Patil".to_string());
        profile.roll_no = Some("TE-A-17".to_string());
        profile.enrolled_face = Some(EnrolledFace {
            photo: photo(1),
            enrolled_at: Utc::now(),
        });
        store.upsert_profile(&profile).await.unwrap();
        profile
    }

    pub async fn unenrolled_student(store: &InMemoryAttendanceStore, email: &str) -> StudentProfile {
        let profile = StudentProfile::new(StudentId::new(), Email::new(email).unwrap());
        store.upsert_profile(&profile).await.unwrap();
        profile
    }

    /// Face service answering with a fixed verdict
    pub struct FakeFaceMatch {
        verdict: AttendanceResult<FaceMatchVerdict>,
        delay: Option<Duration>,
        enroll_success: bool,
        pub compares: AtomicUsize,
    }

    impl FakeFaceMatch {
        pub fn matching(confidence: f64) -> Self {
            Self::answering(Ok(FaceMatchVerdict {
                is_match: true,
                confidence,
                reason: String::new(),
            }))
        }

        pub fn rejecting(reason: &str) -> Self {
            Self::answering(Ok(FaceMatchVerdict {
                is_match: false,
                confidence: 0.12,
                reason: reason.to_string(),
            }))
        }

        pub fn failing() -> Self {
            Self::answering(Err(AttendanceError::FaceService(
                "upstream returned 500".to_string(),
            )))
        }

        pub fn slow(delay: Duration) -> Self {
            let mut fake = Self::matching(0.9);
            fake.delay = Some(delay);
            fake
        }

        pub fn refusing_enrollment() -> Self {
            let mut fake = Self::matching(0.9);
            fake.enroll_success = false;
            fake
        }

        fn answering(verdict: AttendanceResult<FaceMatchVerdict>) -> Self {
            Self {
                verdict,
                delay: None,
                enroll_success: true,
                compares: AtomicUsize::new(0),
            }
        }

        pub fn compare_calls(&self) -> usize {
            self.compares.load(Ordering::SeqCst)
        }
    }

    impl FaceMatchService for FakeFaceMatch {
        async fn compare(
            &self,
            _live: &Photo,
            _enrolled: &Photo,
            _subject_label: &str,
        ) -> AttendanceResult<FaceMatchVerdict> {
            self.compares.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.verdict {
                Ok(verdict) => Ok(verdict.clone()),
                Err(e) => Err(AttendanceError::FaceService(e.to_string())),
            }
        }

        async fn enroll(
            &self,
            _photo: &Photo,
            _student_id: &StudentId,
        ) -> AttendanceResult<EnrollmentReceipt> {
            if self.enroll_success {
                Ok(EnrollmentReceipt {
                    success: true,
                    message: "Face enrolled".to_string(),
                })
            } else {
                Ok(EnrollmentReceipt {
                    success: false,
                    message: "No face detected in the photo".to_string(),
                })
            }
        }
    }

    /// Camera that counts acquisitions and releases
    #[derive(Default)]
    pub struct CountingCamera {
        pub acquired: Arc<AtomicUsize>,
        pub released: Arc<AtomicUsize>,
        pub denied: bool,
    }

    impl CountingCamera {
        pub fn denied() -> Self {
            Self {
                denied: true,
                ..Self::default()
            }
        }

        pub fn acquired(&self) -> usize {
            self.acquired.load(Ordering::SeqCst)
        }

        pub fn released(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }
    }

    struct CountingStream {
        released: Arc<AtomicUsize>,
    }

    impl CameraStream for CountingStream {
        fn capture_frame(&mut self) -> Result<Photo, DeviceError> {
            Ok(photo(2))
        }

        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Camera for CountingCamera {
        async fn acquire(&self) -> Result<Box<dyn CameraStream>, DeviceError> {
            if self.denied {
                return Err(DeviceError::PermissionDenied);
            }
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingStream {
                released: self.released.clone(),
            }))
        }
    }

    /// Store whose history writes always fail
    pub struct HistoryDownStore {
        pub inner: Arc<InMemoryAttendanceStore>,
    }

    impl SessionRepository for HistoryDownStore {
        async fn create_session(&self, session: &LectureSession) -> AttendanceResult<()> {
            self.inner.create_session(session).await
        }

        async fn find_session(
            &self,
            session_id: &SessionId,
        ) -> AttendanceResult<Option<LectureSession>> {
            self.inner.find_session(session_id).await
        }

        async fn end_session(
            &self,
            session_id: &SessionId,
            ended_at: DateTime<Utc>,
        ) -> AttendanceResult<bool> {
            self.inner.end_session(session_id, ended_at).await
        }

        async fn roster(&self, session_id: &SessionId) -> AttendanceResult<Vec<CheckInRecord>> {
            self.inner.roster(session_id).await
        }
    }

    impl AttendanceLedger for HistoryDownStore {
        async fn append_check_in(
            &self,
            session_id: &SessionId,
            record: &CheckInRecord,
        ) -> AttendanceResult<AppendCheckIn> {
            self.inner.append_check_in(session_id, record).await
        }

        async fn append_history(
            &self,
            _student_id: &StudentId,
            _entry: &AttendanceHistoryEntry,
        ) -> AttendanceResult<()> {
            Err(AttendanceError::Internal("history table unavailable".to_string()))
        }
    }
}

#[cfg(test)]
mod check_in_tests {
    use super::fixtures::*;
    use crate::application::check_in::{CheckInContext, CheckInStateMachine};
    use crate::domain::check_in::{CheckInState, CommitOutcome, FailureReason};
    use crate::domain::entities::{LectureSession, StudentProfile};
    use crate::domain::repository::{SessionRepository, StudentProfileRepository};
    use crate::domain::services::{Camera, FaceMatchService, GeofenceCheck};
    use crate::domain::value_objects::{
        AttendanceStatus, GeoPoint, Geofence, ProfessorId, SessionId,
    };
    use crate::error::AttendanceError;
    use crate::infra::memory::InMemoryAttendanceStore;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    type Machine<F, C> = CheckInStateMachine<InMemoryAttendanceStore, F, GeofenceCheck, C>;

    fn machine<F, C>(
        store: &Arc<InMemoryAttendanceStore>,
        face: &Arc<F>,
        camera: &Arc<C>,
        session: &LectureSession,
        student: &StudentProfile,
    ) -> Machine<F, C>
    where
        F: FaceMatchService + Send + Sync + 'static,
        C: Camera + Send + Sync + 'static,
    {
        CheckInStateMachine::new(
            store.clone(),
            face.clone(),
            Arc::new(GeofenceCheck),
            camera.clone(),
            config(),
            CheckInContext {
                session_id: session.id.clone(),
                student: student.clone(),
                position: None,
            },
        )
    }

    fn names<F, C>(m: &Machine<F, C>) -> Vec<&'static str>
    where
        F: FaceMatchService + Send + Sync + 'static,
        C: Camera + Send + Sync + 'static,
    {
        m.trace().iter().map(|t| t.state.name()).collect()
    }

    #[tokio::test]
    async fn test_match_records_once_with_history() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;
        let face = Arc::new(FakeFaceMatch::matching(0.94));
        let camera = Arc::new(CountingCamera::default());

        let mut m = machine(&store, &face, &camera, &session, &student);
        let state = m.run().await.unwrap();

        assert_eq!(
            state,
            CheckInState::VerifiedOk {
                confidence: 0.94,
                commit: CommitOutcome::Recorded,
            }
        );
        assert_eq!(state.progress(), 100);
        assert_eq!(
            names(&m),
            vec![
                "idle",
                "locating",
                "location_ok",
                "camera_on",
                "verifying",
                "verified_ok"
            ]
        );

        let roster = store.roster(&session.id).await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].student_id, student.student_id);
        assert_eq!(roster[0].name, "Asha Patil");
        assert_eq!(roster[0].roll_no, "TE-A-17");

        let history = store.history(&student.student_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, AttendanceStatus::Present);
        assert_eq!(history[0].subject, "Operating Systems");
        assert_eq!(history[0].session_id, session.id);
    }

    #[tokio::test]
    async fn test_no_match_leaves_ledger_untouched() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;
        let face = Arc::new(FakeFaceMatch::rejecting("no face detected"));
        let camera = Arc::new(CountingCamera::default());

        let mut m = machine(&store, &face, &camera, &session, &student);
        let state = m.run().await.unwrap();

        assert_eq!(
            state,
            CheckInState::VerifiedFail {
                reason: FailureReason::NoMatch {
                    reason: "no face detected".to_string(),
                },
            }
        );
        assert_eq!(state.progress(), 80);
        assert!(state.failure().unwrap().message().contains("no face detected"));
        assert_eq!(store.roster_len(&session.id), 0);
        assert!(store.history(&student.student_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_enrolled_skips_face_service() {
        let store = store();
        let session = open_session(&store).await;
        let student = unenrolled_student(&store, "ravi@college.edu").await;
        let face = Arc::new(FakeFaceMatch::matching(0.99));
        let camera = Arc::new(CountingCamera::default());

        let mut m = machine(&store, &face, &camera, &session, &student);
        let state = m.run().await.unwrap();

        assert_eq!(
            state,
            CheckInState::VerifiedFail {
                reason: FailureReason::NotEnrolled,
            }
        );
        assert_eq!(face.compare_calls(), 0);
        assert_eq!(store.roster_len(&session.id), 0);
    }

    #[tokio::test]
    async fn test_camera_released_after_capture() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;
        let face = Arc::new(FakeFaceMatch::matching(0.9));
        let camera = Arc::new(CountingCamera::default());

        let mut m = machine(&store, &face, &camera, &session, &student);
        m.start().await.unwrap();
        assert_eq!(m.state(), &CheckInState::CameraOn);
        assert!(m.camera_active());
        assert_eq!(camera.released(), 0);

        m.capture().await.unwrap();
        assert!(!m.camera_active());
        assert_eq!(camera.acquired(), 1);
        assert_eq!(camera.released(), 1);
    }

    #[tokio::test]
    async fn test_camera_released_when_attempt_abandoned() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;
        let face = Arc::new(FakeFaceMatch::matching(0.9));
        let camera = Arc::new(CountingCamera::default());

        {
            let mut m = machine(&store, &face, &camera, &session, &student);
            m.start().await.unwrap();
            assert_eq!(camera.released(), 0);
        }

        assert_eq!(camera.released(), 1);
        assert_eq!(store.roster_len(&session.id), 0);
    }

    #[tokio::test]
    async fn test_camera_denied_is_device_fail() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;
        let face = Arc::new(FakeFaceMatch::matching(0.9));
        let camera = Arc::new(CountingCamera::denied());

        let mut m = machine(&store, &face, &camera, &session, &student);
        let state = m.run().await.unwrap();

        assert_eq!(state.name(), "device_fail");
        assert_eq!(state.progress(), 33);
        assert!(state.is_terminal());
        assert_eq!(face.compare_calls(), 0);
    }

    #[tokio::test]
    async fn test_outside_geofence_never_opens_camera() {
        let store = store();
        let center = GeoPoint::new(18.5204, 73.8567).unwrap();
        let session = LectureSession::open(
            ProfessorId::new(),
            details(),
            Some(Geofence::new(center, 100.0).unwrap()),
        );
        store.create_session(&session).await.unwrap();
        let student = enrolled_student(&store, "asha@college.edu").await;
        let face = Arc::new(FakeFaceMatch::matching(0.9));
        let camera = Arc::new(CountingCamera::default());

        let mut m = CheckInStateMachine::new(
            store.clone(),
            face.clone(),
            Arc::new(GeofenceCheck),
            camera.clone(),
            config(),
            CheckInContext {
                session_id: session.id.clone(),
                student: student.clone(),
                position: Some(GeoPoint::new(18.5304, 73.8567).unwrap()),
            },
        );
        let state = m.run().await.unwrap();

        assert!(matches!(
            state,
            CheckInState::LocationFail {
                reason: FailureReason::OutsideGeofence { .. }
            }
        ));
        assert_eq!(state.progress(), 10);
        assert_eq!(camera.acquired(), 0);
    }

    #[tokio::test]
    async fn test_missing_session_fails_verification() {
        let store = store();
        let student = enrolled_student(&store, "asha@college.edu").await;
        let ghost = LectureSession::open(ProfessorId::new(), details(), None);
        let face = Arc::new(FakeFaceMatch::matching(0.9));
        let camera = Arc::new(CountingCamera::default());

        let mut m = machine(&store, &face, &camera, &ghost, &student);
        let state = m.run().await.unwrap();

        assert_eq!(
            state,
            CheckInState::VerifiedFail {
                reason: FailureReason::SessionNotFound,
            }
        );
        assert_eq!(camera.acquired(), 0);
    }

    #[tokio::test]
    async fn test_ended_session_rejects_check_in() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;
        store.end_session(&session.id, Utc::now()).await.unwrap();
        let face = Arc::new(FakeFaceMatch::matching(0.9));
        let camera = Arc::new(CountingCamera::default());

        let mut m = machine(&store, &face, &camera, &session, &student);
        let state = m.run().await.unwrap();

        assert_eq!(state.failure().unwrap().message(), "Session ended");
        assert_eq!(store.roster_len(&session.id), 0);
    }

    #[tokio::test]
    async fn test_session_ended_between_start_and_commit() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;
        let face = Arc::new(FakeFaceMatch::matching(0.9));
        let camera = Arc::new(CountingCamera::default());

        let mut m = machine(&store, &face, &camera, &session, &student);
        m.start().await.unwrap();
        store.end_session(&session.id, Utc::now()).await.unwrap();
        let state = m.capture().await.unwrap().clone();

        assert_eq!(
            state,
            CheckInState::VerifiedFail {
                reason: FailureReason::SessionEnded,
            }
        );
        assert_eq!(store.roster_len(&session.id), 0);
        assert!(store.history(&student.student_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_attempt_is_already_recorded() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;
        let face = Arc::new(FakeFaceMatch::matching(0.91));
        let camera = Arc::new(CountingCamera::default());

        let mut m = machine(&store, &face, &camera, &session, &student);
        m.run().await.unwrap();
        m.restart().unwrap();
        assert_eq!(m.trace().len(), 1);

        let state = m.run().await.unwrap();
        assert_eq!(
            state,
            CheckInState::VerifiedOk {
                confidence: 0.91,
                commit: CommitOutcome::AlreadyRecorded,
            }
        );
        assert_eq!(store.roster_len(&session.id), 1);
        assert_eq!(store.history(&student.student_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_history_failure_is_reported_pending() {
        let inner = store();
        let session = open_session(&inner).await;
        let student = enrolled_student(&inner, "asha@college.edu").await;
        let repo = Arc::new(HistoryDownStore {
            inner: inner.clone(),
        });

        let mut m = CheckInStateMachine::new(
            repo,
            Arc::new(FakeFaceMatch::matching(0.88)),
            Arc::new(GeofenceCheck),
            Arc::new(CountingCamera::default()),
            config(),
            CheckInContext {
                session_id: session.id.clone(),
                student: student.clone(),
                position: None,
            },
        );
        let state = m.run().await.unwrap();

        assert_eq!(
            state,
            CheckInState::VerifiedOk {
                confidence: 0.88,
                commit: CommitOutcome::HistoryPending,
            }
        );
        assert_eq!(inner.roster_len(&session.id), 1);
    }

    #[tokio::test]
    async fn test_face_service_error_and_timeout() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;
        let camera = Arc::new(CountingCamera::default());

        let failing = Arc::new(FakeFaceMatch::failing());
        let mut m = machine(&store, &failing, &camera, &session, &student);
        let state = m.run().await.unwrap();
        assert!(matches!(
            state,
            CheckInState::VerifiedFail {
                reason: FailureReason::ServiceError { .. }
            }
        ));

        let slow = Arc::new(FakeFaceMatch::slow(Duration::from_secs(2)));
        let mut m = machine(&store, &slow, &camera, &session, &student);
        let state = m.run().await.unwrap();
        assert_eq!(
            state,
            CheckInState::VerifiedFail {
                reason: FailureReason::ServiceTimedOut,
            }
        );
        assert_eq!(store.roster_len(&session.id), 0);
    }

    #[tokio::test]
    async fn test_confidence_is_clamped() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;
        let face = Arc::new(FakeFaceMatch::matching(1.7));
        let camera = Arc::new(CountingCamera::default());

        let mut m = machine(&store, &face, &camera, &session, &student);
        let state = m.run().await.unwrap();
        assert!(matches!(
            state,
            CheckInState::VerifiedOk { confidence, .. } if confidence == 1.0
        ));
    }

    #[tokio::test]
    async fn test_invalid_actions_are_rejected() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;
        let face = Arc::new(FakeFaceMatch::matching(0.9));
        let camera = Arc::new(CountingCamera::default());

        let mut m = machine(&store, &face, &camera, &session, &student);
        assert!(matches!(
            m.capture().await,
            Err(AttendanceError::InvalidTransition { action: "capture", .. })
        ));
        assert!(matches!(
            m.restart(),
            Err(AttendanceError::InvalidTransition { action: "restart", .. })
        ));

        m.start().await.unwrap();
        assert!(matches!(
            m.start().await,
            Err(AttendanceError::InvalidTransition { action: "start", .. })
        ));
        assert_eq!(m.state(), &CheckInState::CameraOn);
    }

    #[tokio::test]
    async fn test_observer_receives_every_transition() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;
        let face = Arc::new(FakeFaceMatch::matching(0.9));
        let camera = Arc::new(CountingCamera::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut m = machine(&store, &face, &camera, &session, &student).observe(tx);
        m.run().await.unwrap();

        let mut progress = Vec::new();
        while let Ok(transition) = rx.try_recv() {
            progress.push(transition.progress);
        }
        assert_eq!(progress, vec![10, 33, 66, 80, 100]);
    }

    #[tokio::test]
    async fn test_concurrent_attempts_record_one_entry() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;
        let face = Arc::new(FakeFaceMatch::matching(0.93));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let camera = Arc::new(CountingCamera::default());
            let mut m = machine(&store, &face, &camera, &session, &student);
            handles.push(tokio::spawn(async move { m.run().await.unwrap() }));
        }

        let mut recorded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                CheckInState::VerifiedOk {
                    commit: CommitOutcome::Recorded,
                    ..
                } => recorded += 1,
                CheckInState::VerifiedOk {
                    commit: CommitOutcome::AlreadyRecorded,
                    ..
                } => {}
                other => panic!("unexpected state {:?}", other),
            }
        }

        assert_eq!(recorded, 1);
        assert_eq!(store.roster_len(&session.id), 1);
        assert_eq!(store.history(&student.student_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_profile_update_keeps_enrolled_face() {
        let store = store();
        let student = enrolled_student(&store, "asha@college.edu").await;

        let mut changed = student.clone();
        changed.display_name = Some("Asha P.".to_string());
        changed.enrolled_face = None;
        store.upsert_profile(&changed).await.unwrap();

        let stored = store
            .find_profile(&student.student_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name(), "Asha P.");
        assert!(stored.is_enrolled());

        let unknown = SessionId::generate();
        assert!(store.find_session(&unknown).await.unwrap().is_none());
    }
}

#[cfg(test)]
mod ledger_tests {
    use super::fixtures::*;
    use crate::domain::entities::{AttendanceHistoryEntry, CheckInRecord};
    use crate::domain::repository::{
        AppendCheckIn, AttendanceLedger, SessionRepository, StudentProfileRepository,
    };
    use crate::domain::value_objects::SessionId;
    use crate::error::AttendanceError;
    use chrono::{Duration, Utc};
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_append_is_idempotent_per_student() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;
        let record = CheckInRecord::for_student(&student, Utc::now());

        let first = assert_ok!(store.append_check_in(&session.id, &record).await);
        assert_eq!(first, AppendCheckIn::Recorded);
        let second = assert_ok!(store.append_check_in(&session.id, &record).await);
        assert_eq!(second, AppendCheckIn::Duplicate);
        assert_eq!(store.roster_len(&session.id), 1);
    }

    #[tokio::test]
    async fn test_append_after_end_is_already_ended() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;

        assert!(store.end_session(&session.id, Utc::now()).await.unwrap());
        assert!(!store.end_session(&session.id, Utc::now()).await.unwrap());

        let record = CheckInRecord::for_student(&student, Utc::now());
        assert_eq!(
            store.append_check_in(&session.id, &record).await.unwrap(),
            AppendCheckIn::AlreadyEnded
        );
        assert_eq!(store.roster_len(&session.id), 0);
    }

    #[tokio::test]
    async fn test_append_to_unknown_session() {
        let store = store();
        let student = enrolled_student(&store, "asha@college.edu").await;
        let record = CheckInRecord::for_student(&student, Utc::now());

        let err = assert_err!(store.append_check_in(&SessionId::generate(), &record).await);
        assert!(matches!(err, AttendanceError::SessionNotFound));
    }

    #[tokio::test]
    async fn test_roster_keeps_commit_order() {
        let store = store();
        let session = open_session(&store).await;
        let first = enrolled_student(&store, "first@college.edu").await;
        let second = enrolled_student(&store, "second@college.edu").await;

        for student in [&first, &second] {
            let record = CheckInRecord::for_student(student, Utc::now());
            store.append_check_in(&session.id, &record).await.unwrap();
        }

        let roster = store.roster(&session.id).await.unwrap();
        assert_eq!(roster[0].student_id, first.student_id);
        assert_eq!(roster[1].student_id, second.student_id);
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_first_entry_wins() {
        let store = store();
        let student = enrolled_student(&store, "asha@college.edu").await;
        let older = open_session(&store).await;
        let newer = open_session(&store).await;
        let now = Utc::now();

        let old_entry = AttendanceHistoryEntry::present(&older, now - Duration::hours(2));
        store.append_history(&student.student_id, &old_entry).await.unwrap();
        let new_entry = AttendanceHistoryEntry::present(&newer, now);
        store.append_history(&student.student_id, &new_entry).await.unwrap();
        let replay = AttendanceHistoryEntry::present(&older, now + Duration::hours(1));
        store.append_history(&student.student_id, &replay).await.unwrap();

        let history = store.history(&student.student_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].session_id, newer.id);
        assert_eq!(history[1].session_id, older.id);
        assert_eq!(history[1].recorded_at, old_entry.recorded_at);
    }
}

#[cfg(test)]
mod aggregator_tests {
    use super::fixtures::*;
    use crate::application::session_aggregator::{SessionAggregator, SessionView};
    use crate::domain::entities::CheckInRecord;
    use crate::domain::events::{SessionChange, SessionFeed};
    use crate::domain::repository::{AttendanceLedger, SessionRepository};
    use crate::domain::value_objects::SessionId;
    use crate::error::AttendanceError;
    use crate::infra::live_feed::SessionFeedHub;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_snapshot_counts_distinct_students() {
        let store = store();
        let session = open_session(&store).await;
        let a = enrolled_student(&store, "a@college.edu").await;
        let b = enrolled_student(&store, "b@college.edu").await;
        for student in [&a, &b, &a] {
            let record = CheckInRecord::for_student(student, Utc::now());
            store.append_check_in(&session.id, &record).await.unwrap();
        }

        let aggregator = SessionAggregator::new(store.clone(), store.feed());
        let view = aggregator.snapshot(&session.id).await.unwrap();

        assert_eq!(view.count, 2);
        assert_eq!(view.roster.len(), 2);
        assert!(view.active);
    }

    #[tokio::test]
    async fn test_snapshot_of_unknown_session() {
        let store = store();
        let aggregator = SessionAggregator::new(store.clone(), store.feed());
        let result = aggregator.snapshot(&SessionId::generate()).await;
        assert!(matches!(result, Err(AttendanceError::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_live_view_follows_check_ins_and_end() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;

        let aggregator = SessionAggregator::new(store.clone(), store.feed());
        let mut live = aggregator.watch(&session.id).await.unwrap();
        assert_eq!(live.view().count, 0);

        let record = CheckInRecord::for_student(&student, Utc::now());
        store.append_check_in(&session.id, &record).await.unwrap();
        store.append_check_in(&session.id, &record).await.unwrap();

        let view = timeout(Duration::from_secs(1), live.changed())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(view.count, 1);
        assert!(view.contains(&record));

        store.end_session(&session.id, Utc::now()).await.unwrap();
        let view = timeout(Duration::from_secs(1), live.changed())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
            .clone();
        assert!(!view.active);
        assert!(view.ended_at.is_some());
        assert_eq!(view.count, 1);
    }

    #[tokio::test]
    async fn test_resync_reloads_missed_check_ins() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;

        // The store publishes to its own hub, so this view never hears the check-in
        let detached = Arc::new(SessionFeedHub::new(16));
        let aggregator = SessionAggregator::new(store.clone(), detached.clone());
        let mut live = aggregator.watch(&session.id).await.unwrap();
        assert_eq!(live.view().count, 0);

        let record = CheckInRecord::for_student(&student, Utc::now());
        store.append_check_in(&session.id, &record).await.unwrap();
        assert!(
            timeout(Duration::from_millis(50), live.changed())
                .await
                .is_err()
        );

        assert_eq!(detached.resync_all(), 1);
        let view = timeout(Duration::from_secs(1), live.changed())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(view.count, 1);
        assert!(view.contains(&record));
        assert!(view.active);
    }

    #[tokio::test]
    async fn test_resync_picks_up_missed_end() {
        let store = store();
        let session = open_session(&store).await;

        let detached = Arc::new(SessionFeedHub::new(16));
        let aggregator = SessionAggregator::new(store.clone(), detached.clone());
        let mut live = aggregator.watch(&session.id).await.unwrap();

        store.end_session(&session.id, Utc::now()).await.unwrap();
        detached.resync_all();

        let view = timeout(Duration::from_secs(1), live.changed())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!view.active);
        assert!(view.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_apply_is_idempotent_and_never_reactivates() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;
        let record = CheckInRecord::for_student(&student, Utc::now());

        let mut view = SessionView::new(&session, Vec::new());
        let checked_in = SessionChange::CheckedIn {
            session_id: session.id.clone(),
            record: record.clone(),
        };
        assert!(view.apply(&checked_in));
        assert!(!view.apply(&checked_in));
        assert_eq!(view.count, 1);

        let ended = SessionChange::Ended {
            session_id: session.id.clone(),
            ended_at: Utc::now(),
        };
        assert!(view.apply(&ended));
        assert!(!view.apply(&ended));
        assert!(!view.active);

        let other = SessionChange::CheckedIn {
            session_id: SessionId::generate(),
            record,
        };
        assert!(!view.apply(&other));
    }
}

#[cfg(test)]
mod use_case_tests {
    use super::fixtures::*;
    use crate::application::create_session::{CreateSessionInput, CreateSessionUseCase};
    use crate::application::end_session::EndSessionUseCase;
    use crate::application::enroll_face::EnrollFaceUseCase;
    use crate::application::student_profile::{StudentProfileUseCase, UpdateProfileInput};
    use crate::domain::entry_url::parse_entry_url;
    use crate::domain::repository::SessionRepository;
    use crate::domain::value_objects::{Email, ProfessorId, StudentId};
    use crate::error::AttendanceError;
    use kernel::error::kind::ErrorKind;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_session_returns_entry_url() {
        let store = store();
        let use_case = CreateSessionUseCase::new(store.clone(), config());

        let output = use_case
            .execute(CreateSessionInput {
                professor_id: ProfessorId::new(),
                details: details(),
                geofence: None,
            })
            .await
            .unwrap();

        assert!(output.session.active);
        assert_eq!(parse_entry_url(&output.entry_url).unwrap(), output.session.id);
        assert!(
            store
                .find_session(&output.session.id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_create_session_requires_every_detail() {
        let store = store();
        let use_case = CreateSessionUseCase::new(store, config());
        let mut incomplete = details();
        incomplete.subject = " ".to_string();

        let err = use_case
            .execute(CreateSessionInput {
                professor_id: ProfessorId::new(),
                details: incomplete,
                geofence: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(err.to_string().contains("subject"));
    }

    #[tokio::test]
    async fn test_end_session_checks_owner_and_is_idempotent() {
        let store = store();
        let session = open_session(&store).await;
        let use_case = EndSessionUseCase::new(store.clone());

        let err = use_case
            .execute(session.id.clone(), ProfessorId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::NotSessionOwner));

        let first = use_case
            .execute(session.id.clone(), session.professor_id)
            .await
            .unwrap();
        assert!(first.changed);
        assert!(first.ended_at.is_some());

        let second = use_case
            .execute(session.id.clone(), session.professor_id)
            .await
            .unwrap();
        assert!(!second.changed);
        assert_eq!(second.ended_at, first.ended_at);
    }

    #[tokio::test]
    async fn test_enrollment_stores_face_or_reports_rejection() {
        let store = store();
        let student = unenrolled_student(&store, "ravi@college.edu").await;

        let rejected = EnrollFaceUseCase::new(
            store.clone(),
            Arc::new(FakeFaceMatch::refusing_enrollment()),
            config(),
        )
        .execute(student.student_id, photo(9))
        .await
        .unwrap_err();
        assert!(matches!(rejected, AttendanceError::EnrollmentRejected(_)));

        let profiles = StudentProfileUseCase::new(store.clone());
        assert!(!profiles.get(&student.student_id).await.unwrap().is_enrolled());

        let output = EnrollFaceUseCase::new(
            store.clone(),
            Arc::new(FakeFaceMatch::matching(0.9)),
            config(),
        )
        .execute(student.student_id, photo(9))
        .await
        .unwrap();
        assert_eq!(output.student_id, student.student_id);

        let stored = profiles.get(&student.student_id).await.unwrap();
        assert_eq!(stored.enrolled_face.unwrap().photo, photo(9));
    }

    #[tokio::test]
    async fn test_enrollment_requires_profile() {
        let store = store();
        let err = EnrollFaceUseCase::new(store, Arc::new(FakeFaceMatch::matching(0.9)), config())
            .execute(StudentId::new(), photo(3))
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::StudentNotFound));
    }

    #[tokio::test]
    async fn test_profile_update_and_history_lookup() {
        let store = store();
        let profiles = StudentProfileUseCase::new(store.clone());
        let student_id = StudentId::new();

        let err = profiles.history(&student_id).await.unwrap_err();
        assert!(matches!(err, AttendanceError::StudentNotFound));

        let profile = profiles
            .update(UpdateProfileInput {
                student_id,
                email: Email::new("Neha.K@College.edu").unwrap(),
                display_name: Some("  ".to_string()),
                roll_no: None,
            })
            .await
            .unwrap();

        assert_eq!(profile.email.as_str(), "neha.k@college.edu");
        assert_eq!(profile.name(), "neha.k");
        assert!(profiles.history(&student_id).await.unwrap().is_empty());
    }
}

#[cfg(test)]
mod router_tests {
    use super::fixtures::*;
    use crate::application::config::AttendanceConfig;
    use crate::domain::repository::{SessionRepository, StudentProfileRepository};
    use crate::infra::memory::InMemoryAttendanceStore;
    use crate::presentation::router::attendance_router_generic;
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;
    use tower::ServiceExt;

    fn app(store: &Arc<InMemoryAttendanceStore>, face: FakeFaceMatch) -> Router {
        attendance_router_generic(
            store.as_ref().clone(),
            face,
            store.feed(),
            AttendanceConfig::development(),
        )
        .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 7], 51000))))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn session_body(professor_id: &str) -> Value {
        json!({
            "professorId": professor_id,
            "department": "Computer Engineering",
            "year": "TE",
            "division": "A",
            "subject": "Operating Systems",
            "lectureDate": "2026-10-12",
            "lectureTime": "10:00"
        })
    }

    #[tokio::test]
    async fn test_create_and_read_session() {
        let store = store();
        let professor = crate::domain::value_objects::ProfessorId::new().to_string();

        let (status, created) = send(
            app(&store, FakeFaceMatch::matching(0.9)),
            "POST",
            "/sessions",
            Some(session_body(&professor)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["active"], true);
        let session_id = created["sessionId"].as_str().unwrap().to_string();
        assert!(
            created["entryUrl"]
                .as_str()
                .unwrap()
                .ends_with(&format!("/attend?sessionId={}", session_id))
        );

        let (status, view) = send(
            app(&store, FakeFaceMatch::matching(0.9)),
            "GET",
            &format!("/sessions/{}", session_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["count"], 0);
        assert_eq!(view["details"]["subject"], "Operating Systems");

        let (status, resolved) = send(
            app(&store, FakeFaceMatch::matching(0.9)),
            "POST",
            "/entry-url/resolve",
            Some(json!({ "text": created["entryUrl"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resolved["sessionId"], session_id.as_str());
    }

    #[tokio::test]
    async fn test_create_session_with_missing_details() {
        let store = store();
        let professor = crate::domain::value_objects::ProfessorId::new().to_string();
        let mut body = session_body(&professor);
        body["lectureTime"] = json!("");

        let (status, problem) = send(
            app(&store, FakeFaceMatch::matching(0.9)),
            "POST",
            "/sessions",
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(problem["detail"].as_str().unwrap().contains("lectureTime"));
    }

    #[tokio::test]
    async fn test_check_in_over_http() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;

        let body = json!({
            "sessionId": session.id.as_str(),
            "studentId": student.student_id.to_string(),
            "photoDataUri": photo(5).to_data_uri(),
        });
        let (status, response) = send(
            app(&store, FakeFaceMatch::matching(0.94)),
            "POST",
            "/check-in",
            Some(body.clone()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["state"], "verified_ok");
        assert_eq!(response["checkedIn"], true);
        assert_eq!(response["commit"], "recorded");
        assert_eq!(response["progress"], 100);
        assert_eq!(store.roster(&session.id).await.unwrap().len(), 1);

        let (_, again) = send(
            app(&store, FakeFaceMatch::matching(0.94)),
            "POST",
            "/check-in",
            Some(body),
        )
        .await;
        assert_eq!(again["commit"], "already_recorded");
        assert_eq!(store.roster(&session.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_check_in_without_frame_is_device_fail() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;

        let (status, response) = send(
            app(&store, FakeFaceMatch::matching(0.94)),
            "POST",
            "/check-in",
            Some(json!({
                "sessionId": session.id.as_str(),
                "studentId": student.student_id.to_string(),
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["state"], "device_fail");
        assert_eq!(response["checkedIn"], false);
        assert!(response["message"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_live_stream_follows_session_until_end() {
        let store = store();
        let session = open_session(&store).await;
        let student = enrolled_student(&store, "asha@college.edu").await;

        let response = app(&store, FakeFaceMatch::matching(0.9))
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{}/live", session.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );

        let (status, _) = send(
            app(&store, FakeFaceMatch::matching(0.9)),
            "POST",
            "/check-in",
            Some(json!({
                "sessionId": session.id.as_str(),
                "studentId": student.student_id.to_string(),
                "photoDataUri": photo(5).to_data_uri(),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            app(&store, FakeFaceMatch::matching(0.9)),
            "POST",
            &format!("/sessions/{}/end", session.id),
            Some(json!({ "professorId": session.professor_id.to_string() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // The stream closes by itself once the ended view has been sent
        let bytes = timeout(
            Duration::from_secs(2),
            to_bytes(response.into_body(), 1024 * 1024),
        )
        .await
        .unwrap()
        .unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        let frames: Vec<&str> = body
            .split("\n\n")
            .filter(|frame| frame.contains("event: session"))
            .collect();

        assert_eq!(frames.len(), 3);
        assert!(frames[0].contains(r#""count":0"#));
        assert!(frames[1].contains(r#""count":1"#));
        assert!(frames[2].contains(r#""active":false"#));
        assert!(frames[2].contains(r#""count":1"#));
    }

    #[tokio::test]
    async fn test_end_session_requires_owner() {
        let store = store();
        let session = open_session(&store).await;
        let stranger = crate::domain::value_objects::ProfessorId::new().to_string();

        let (status, _) = send(
            app(&store, FakeFaceMatch::matching(0.9)),
            "POST",
            &format!("/sessions/{}/end", session.id),
            Some(json!({ "professorId": stranger })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, ended) = send(
            app(&store, FakeFaceMatch::matching(0.9)),
            "POST",
            &format!("/sessions/{}/end", session.id),
            Some(json!({ "professorId": session.professor_id.to_string() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ended["changed"], true);
        assert_eq!(ended["active"], false);
        assert!(!store.find_session(&session.id).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_profile_enrollment_and_history_routes() {
        let store = store();
        let student_id = crate::domain::value_objects::StudentId::new();

        let (status, _) = send(
            app(&store, FakeFaceMatch::matching(0.9)),
            "GET",
            &format!("/students/{}/profile", student_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, profile) = send(
            app(&store, FakeFaceMatch::matching(0.9)),
            "PUT",
            &format!("/students/{}/profile", student_id),
            Some(json!({ "email": "meera@college.edu", "rollNo": "TE-A-03" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["name"], "meera");
        assert_eq!(profile["enrolled"], false);

        let (status, _) = send(
            app(&store, FakeFaceMatch::refusing_enrollment()),
            "POST",
            &format!("/students/{}/enrollment", student_id),
            Some(json!({ "photoDataUri": photo(4).to_data_uri() })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(
            app(&store, FakeFaceMatch::matching(0.9)),
            "POST",
            &format!("/students/{}/enrollment", student_id),
            Some(json!({ "photoDataUri": photo(4).to_data_uri() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(
            store
                .find_profile(&student_id)
                .await
                .unwrap()
                .unwrap()
                .is_enrolled()
        );

        let (status, history) = send(
            app(&store, FakeFaceMatch::matching(0.9)),
            "GET",
            &format!("/students/{}/history", student_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["entries"], json!([]));
    }

    #[tokio::test]
    async fn test_malformed_ids_are_bad_requests() {
        let store = store();

        let (status, _) = send(
            app(&store, FakeFaceMatch::matching(0.9)),
            "GET",
            "/students/not-a-uuid/profile",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            app(&store, FakeFaceMatch::matching(0.9)),
            "GET",
            "/sessions/unknown-session",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
