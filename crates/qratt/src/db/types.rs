/// Database types for activities, meetings and attendance records
use crate::attendance::{AttendanceStatus, MeetingStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A course activity instance owning a set of meetings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Activity {
    pub activity_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// One scheduled attendance-taking session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Meeting {
    pub meeting_id: i64,
    pub activity_id: i64,
    pub meeting_number: i64,
    pub topic: String,
    pub meeting_date: DateTime<Utc>,
    pub status: MeetingStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub qr_code: Option<String>, // payload URL
    pub qr_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Editable fields of a meeting, as submitted by the add/edit form.
#[derive(Debug, Clone, PartialEq)]
pub struct MeetingDetails {
    pub meeting_number: i64,
    pub topic: String,
    pub meeting_date: DateTime<Utc>,
}

/// Stored status of one student for one meeting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub meeting_id: i64,
    pub user_id: i64,
    pub status: AttendanceStatus,
    pub scan_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// An enrolled user as provided by the host roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Student {
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Result of a manual-entry write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualWrite {
    /// A new record was inserted
    Saved,
    /// An existing record was overwritten
    Updated,
}
