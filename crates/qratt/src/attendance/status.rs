//! Meeting and attendance status values shared by the store, the recorder and reports.

use serde::{Deserialize, Serialize};

/// Lifecycle of a meeting. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Inactive,
    Active,
    Ended,
}

impl MeetingStatus {
    /// Integer stored in the `meetings.status` column.
    pub fn code(self) -> i64 {
        match self {
            MeetingStatus::Inactive => 0,
            MeetingStatus::Active => 1,
            MeetingStatus::Ended => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(MeetingStatus::Inactive),
            1 => Some(MeetingStatus::Active),
            2 => Some(MeetingStatus::Ended),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MeetingStatus::Inactive => "Inactive",
            MeetingStatus::Active => "Active",
            MeetingStatus::Ended => "Ended",
        }
    }
}

/// Status of one student for one meeting.
///
/// The codes match the values exchanged in manual-entry form submissions and
/// the `status_value` column of the status catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn code(self) -> i64 {
        match self {
            AttendanceStatus::Present => 1,
            AttendanceStatus::Absent => 2,
            AttendanceStatus::Late => 3,
            AttendanceStatus::Excused => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(AttendanceStatus::Present),
            2 => Some(AttendanceStatus::Absent),
            3 => Some(AttendanceStatus::Late),
            4 => Some(AttendanceStatus::Excused),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Late => "Late",
            AttendanceStatus::Excused => "Excused",
        }
    }

    /// Present and Late both count as attended.
    pub fn is_attended(self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Late)
    }

    /// Reads an optional record as a status. No record means Absent.
    pub fn or_absent(status: Option<AttendanceStatus>) -> AttendanceStatus {
        status.unwrap_or(AttendanceStatus::Absent)
    }
}

/// A row of the master status catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDefinition {
    pub status: AttendanceStatus,
    pub label: String,
    pub grade: f64,
    pub visible: bool,
    pub sort_order: i64,
}

/// Catalogue rows inserted when the store is first created.
pub fn default_catalogue() -> Vec<StatusDefinition> {
    [
        (AttendanceStatus::Present, 1.0),
        (AttendanceStatus::Absent, 0.0),
        (AttendanceStatus::Late, 0.5),
        (AttendanceStatus::Excused, 0.0),
    ]
    .into_iter()
    .enumerate()
    .map(|(i, (status, grade))| StatusDefinition {
        status,
        label: status.label().to_string(),
        grade,
        visible: true,
        sort_order: i as i64,
    })
    .collect()
}
