//! PostgreSQL Repository Implementations
//!
//! Change notifications are emitted by triggers (see the migrations) and
//! forwarded to the live feed by `infra::notify`.

use crate::domain::entities::{
    AttendanceHistoryEntry, CheckInRecord, EnrolledFace, LectureSession, StudentProfile,
};
use crate::domain::repository::{
    AppendCheckIn, AttendanceLedger, SessionRepository, StudentProfileRepository,
};
use crate::domain::value_objects::{
    AttendanceStatus, Email, GeoPoint, Geofence, LectureDetails, Photo, ProfessorId, SessionId,
    StudentId,
};
use crate::error::{AttendanceError, AttendanceResult};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL-backed repository
#[derive(Clone)]
pub struct PgAttendanceRepository {
    pool: PgPool,
}

impl PgAttendanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl SessionRepository for PgAttendanceRepository {
    async fn create_session(&self, session: &LectureSession) -> AttendanceResult<()> {
        let (lat, lon, radius) = match &session.geofence {
            Some(fence) => (
                Some(fence.center.latitude),
                Some(fence.center.longitude),
                Some(fence.radius_m),
            ),
            None => (None, None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO attendance_sessions (
                session_id,
                professor_id,
                department,
                year,
                division,
                subject,
                lecture_date,
                lecture_time,
                geofence_lat,
                geofence_lon,
                geofence_radius_m,
                active,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(session.id.as_str())
        .bind(session.professor_id.into_uuid())
        .bind(&session.details.department)
        .bind(&session.details.year)
        .bind(&session.details.division)
        .bind(&session.details.subject)
        .bind(&session.details.lecture_date)
        .bind(&session.details.lecture_time)
        .bind(lat)
        .bind(lon)
        .bind(radius)
        .bind(session.active)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(session_id = %session.id, "Session row inserted");
        Ok(())
    }

    async fn find_session(&self, session_id: &SessionId) -> AttendanceResult<Option<LectureSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT
                session_id,
                professor_id,
                department,
                year,
                division,
                subject,
                lecture_date,
                lecture_time,
                geofence_lat,
                geofence_lon,
                geofence_radius_m,
                active,
                created_at,
                ended_at
            FROM attendance_sessions
            WHERE session_id = $1
            "#,
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRow::into_session).transpose()
    }

    async fn end_session(
        &self,
        session_id: &SessionId,
        ended_at: DateTime<Utc>,
    ) -> AttendanceResult<bool> {
        let updated = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            UPDATE attendance_sessions
            SET active = FALSE, ended_at = $2
            WHERE session_id = $1 AND active
            RETURNING ended_at
            "#,
        )
        .bind(session_id.as_str())
        .bind(ended_at)
        .fetch_optional(&self.pool)
        .await?;

        if updated.is_some() {
            return Ok(true);
        }

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM attendance_sessions WHERE session_id = $1)",
        )
        .bind(session_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        if exists {
            Ok(false)
        } else {
            Err(AttendanceError::SessionNotFound)
        }
    }

    async fn roster(&self, session_id: &SessionId) -> AttendanceResult<Vec<CheckInRecord>> {
        let rows = sqlx::query_as::<_, CheckInRow>(
            r#"
            SELECT student_id, student_name, roll_no, email, checked_in_at
            FROM attendance_check_ins
            WHERE session_id = $1
            ORDER BY seq
            "#,
        )
        .bind(session_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CheckInRow::into_record).collect())
    }
}

impl AttendanceLedger for PgAttendanceRepository {
    async fn append_check_in(
        &self,
        session_id: &SessionId,
        record: &CheckInRecord,
    ) -> AttendanceResult<AppendCheckIn> {
        // The session row is share-locked, so an end request either
        // commits before this read or waits for the insert.
        let (active, inserted) = sqlx::query_as::<_, (Option<bool>, bool)>(
            r#"
            WITH target AS (
                SELECT session_id, active
                FROM attendance_sessions
                WHERE session_id = $1
                FOR SHARE
            ),
            inserted AS (
                INSERT INTO attendance_check_ins (
                    session_id,
                    student_id,
                    student_name,
                    roll_no,
                    email,
                    checked_in_at
                )
                SELECT target.session_id, $2, $3, $4, $5, $6
                FROM target
                WHERE target.active
                ON CONFLICT (session_id, student_id) DO NOTHING
                RETURNING student_id
            )
            SELECT
                (SELECT active FROM target) AS active,
                EXISTS(SELECT 1 FROM inserted) AS inserted
            "#,
        )
        .bind(session_id.as_str())
        .bind(record.student_id.into_uuid())
        .bind(&record.name)
        .bind(&record.roll_no)
        .bind(record.email.as_str())
        .bind(record.checked_in_at)
        .fetch_one(&self.pool)
        .await?;

        let outcome = match (active, inserted) {
            (None, _) => return Err(AttendanceError::SessionNotFound),
            (Some(false), _) => AppendCheckIn::AlreadyEnded,
            (Some(true), true) => AppendCheckIn::Recorded,
            (Some(true), false) => AppendCheckIn::Duplicate,
        };

        tracing::info!(
            session_id = %session_id,
            student_id = %record.student_id,
            outcome = ?outcome,
            "Check-in appended"
        );

        Ok(outcome)
    }

    async fn append_history(
        &self,
        student_id: &StudentId,
        entry: &AttendanceHistoryEntry,
    ) -> AttendanceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO attendance_history (
                student_id,
                session_id,
                subject,
                lecture_date,
                status,
                recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (student_id, session_id) DO NOTHING
            "#,
        )
        .bind(student_id.into_uuid())
        .bind(entry.session_id.as_str())
        .bind(&entry.subject)
        .bind(&entry.date)
        .bind(entry.status.as_str())
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl StudentProfileRepository for PgAttendanceRepository {
    async fn find_profile(&self, student_id: &StudentId) -> AttendanceResult<Option<StudentProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT
                student_id,
                email,
                display_name,
                roll_no,
                face_mime,
                face_bytes,
                face_enrolled_at
            FROM student_profiles
            WHERE student_id = $1
            "#,
        )
        .bind(student_id.into_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProfileRow::into_profile).transpose()
    }

    async fn upsert_profile(&self, profile: &StudentProfile) -> AttendanceResult<()> {
        let face = profile.enrolled_face.as_ref();

        sqlx::query(
            r#"
            INSERT INTO student_profiles (
                student_id,
                email,
                display_name,
                roll_no,
                face_mime,
                face_bytes,
                face_enrolled_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (student_id) DO UPDATE SET
                email = EXCLUDED.email,
                display_name = EXCLUDED.display_name,
                roll_no = EXCLUDED.roll_no,
                updated_at = now()
            "#,
        )
        .bind(profile.student_id.into_uuid())
        .bind(profile.email.as_str())
        .bind(profile.display_name.as_deref())
        .bind(profile.roll_no.as_deref())
        .bind(face.map(|f| f.photo.mime()))
        .bind(face.map(|f| f.photo.bytes()))
        .bind(face.map(|f| f.enrolled_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_enrolled_face(
        &self,
        student_id: &StudentId,
        face: &EnrolledFace,
    ) -> AttendanceResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE student_profiles
            SET face_mime = $2, face_bytes = $3, face_enrolled_at = $4, updated_at = now()
            WHERE student_id = $1
            "#,
        )
        .bind(student_id.into_uuid())
        .bind(face.photo.mime())
        .bind(face.photo.bytes())
        .bind(face.enrolled_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AttendanceError::StudentNotFound);
        }
        Ok(())
    }

    async fn history(&self, student_id: &StudentId) -> AttendanceResult<Vec<AttendanceHistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT session_id, subject, lecture_date, status, recorded_at
            FROM attendance_history
            WHERE student_id = $1
            ORDER BY recorded_at DESC
            "#,
        )
        .bind(student_id.into_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(HistoryRow::into_entry).collect()
    }
}

// Internal row types for sqlx mapping
#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    professor_id: Uuid,
    department: String,
    year: String,
    division: String,
    subject: String,
    lecture_date: String,
    lecture_time: String,
    geofence_lat: Option<f64>,
    geofence_lon: Option<f64>,
    geofence_radius_m: Option<f64>,
    active: bool,
    created_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl SessionRow {
    fn into_session(self) -> AttendanceResult<LectureSession> {
        let geofence = match (self.geofence_lat, self.geofence_lon, self.geofence_radius_m) {
            (Some(lat), Some(lon), Some(radius)) => Some(
                GeoPoint::new(lat, lon)
                    .and_then(|center| Geofence::new(center, radius))
                    .map_err(|e| AttendanceError::Internal(format!("stored geofence: {}", e)))?,
            ),
            _ => None,
        };

        Ok(LectureSession {
            id: SessionId::from_db(self.session_id),
            professor_id: ProfessorId::from_uuid(self.professor_id),
            details: LectureDetails {
                department: self.department,
                year: self.year,
                division: self.division,
                subject: self.subject,
                lecture_date: self.lecture_date,
                lecture_time: self.lecture_time,
            },
            geofence,
            active: self.active,
            created_at: self.created_at,
            ended_at: self.ended_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CheckInRow {
    student_id: Uuid,
    student_name: String,
    roll_no: String,
    email: String,
    checked_in_at: DateTime<Utc>,
}

impl CheckInRow {
    fn into_record(self) -> CheckInRecord {
        CheckInRecord {
            student_id: StudentId::from_uuid(self.student_id),
            name: self.student_name,
            roll_no: self.roll_no,
            email: Email::from_db(self.email),
            checked_in_at: self.checked_in_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    student_id: Uuid,
    email: String,
    display_name: Option<String>,
    roll_no: Option<String>,
    face_mime: Option<String>,
    face_bytes: Option<Vec<u8>>,
    face_enrolled_at: Option<DateTime<Utc>>,
}

impl ProfileRow {
    fn into_profile(self) -> AttendanceResult<StudentProfile> {
        let enrolled_face = match (self.face_mime, self.face_bytes, self.face_enrolled_at) {
            (Some(mime), Some(bytes), Some(enrolled_at)) => Some(EnrolledFace {
                photo: Photo::new(mime, bytes)
                    .map_err(|e| AttendanceError::Internal(format!("stored face: {}", e)))?,
                enrolled_at,
            }),
            _ => None,
        };

        Ok(StudentProfile {
            student_id: StudentId::from_uuid(self.student_id),
            email: Email::from_db(self.email),
            display_name: self.display_name,
            roll_no: self.roll_no,
            enrolled_face,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    session_id: String,
    subject: String,
    lecture_date: String,
    status: String,
    recorded_at: DateTime<Utc>,
}

impl HistoryRow {
    fn into_entry(self) -> AttendanceResult<AttendanceHistoryEntry> {
        Ok(AttendanceHistoryEntry {
            session_id: SessionId::from_db(self.session_id),
            subject: self.subject,
            date: self.lecture_date,
            status: AttendanceStatus::from_db(&self.status)
                .map_err(|e| AttendanceError::Internal(e.to_string()))?,
            recorded_at: self.recorded_at,
        })
    }
}
