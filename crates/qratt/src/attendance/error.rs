//! Error types for the attendance subsystem.

use thiserror::Error;

/// Errors that can occur while managing meetings and attendance.
///
/// Scan-path rejections are not errors; see [`super::recorder::ScanOutcome`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AttendanceError {
    /// The activity id does not resolve
    #[error("Activity {activity_id} not found")]
    ActivityNotFound { activity_id: i64 },

    /// The meeting id does not resolve (or belongs to another activity)
    #[error("Meeting {meeting_id} not found")]
    MeetingNotFound { meeting_id: i64 },

    /// Another meeting of the activity already uses this number
    #[error("This meeting number already exists: {meeting_number}")]
    DuplicateMeetingNumber { meeting_number: i64 },

    /// Meeting number outside of the accepted range
    #[error("Meeting number {meeting_number} must be between 1 and {max}")]
    InvalidMeetingNumber { meeting_number: i64, max: i64 },

    /// Topic was blank
    #[error("Meeting topic is required")]
    EmptyTopic,

    #[error("Activity name is required")]
    EmptyActivityName,

    /// Manual entry carried a code that is not in the status catalogue
    #[error("Unknown attendance status code {code} for user {user_id}")]
    InvalidStatusCode { user_id: i64, code: i64 },

    /// A pasted QR payload URL could not be understood
    #[error("Invalid QR code URL: {message}")]
    InvalidQrUrl { message: String },

    /// The storage engine failed
    #[error("Database error: {message}")]
    Database { message: String },

    /// Writing the CSV export failed
    #[error("CSV export error: {message}")]
    Csv { message: String },
}

impl AttendanceError {
    /// Returns true if the request referenced something that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AttendanceError::ActivityNotFound { .. } | AttendanceError::MeetingNotFound { .. }
        )
    }

    /// Returns true if the error is a rejected form submission.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AttendanceError::DuplicateMeetingNumber { .. }
                | AttendanceError::InvalidMeetingNumber { .. }
                | AttendanceError::EmptyTopic
                | AttendanceError::EmptyActivityName
                | AttendanceError::InvalidStatusCode { .. }
                | AttendanceError::InvalidQrUrl { .. }
        )
    }
}

impl From<rusqlite::Error> for AttendanceError {
    fn from(err: rusqlite::Error) -> Self {
        AttendanceError::Database {
            message: err.to_string(),
        }
    }
}

impl From<csv::Error> for AttendanceError {
    fn from(err: csv::Error) -> Self {
        AttendanceError::Csv {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for AttendanceError {
    fn from(err: url::ParseError) -> Self {
        AttendanceError::InvalidQrUrl {
            message: err.to_string(),
        }
    }
}
