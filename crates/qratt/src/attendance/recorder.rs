//! Attendance recording: student self-scan and instructor manual entry.

use super::error::AttendanceError;
use super::status::{AttendanceStatus, MeetingStatus};
use super::AttendanceService;
use crate::db::{ManualWrite, Meeting, Roster, Student};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Minutes after the meeting start during which a scan still counts as Present.
pub const LATE_THRESHOLD_MINUTES: i64 = 15;

/// Terminal result of one scan attempt. Only `Marked` writes anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    NotActive,
    Expired,
    InvalidToken,
    /// A record already exists; it is left untouched
    AlreadyMarked(AttendanceStatus),
    Marked(AttendanceStatus),
}

impl ScanOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            ScanOutcome::NotActive => "Meeting is not active",
            ScanOutcome::Expired => "QR code has expired",
            ScanOutcome::InvalidToken => "Invalid QR code",
            ScanOutcome::AlreadyMarked(_) => "Attendance already marked for this meeting",
            ScanOutcome::Marked(_) => "Attendance marked successfully",
        }
    }
}

/// Counts reported back after a manual save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ManualSaveSummary {
    pub saved: usize,
    pub updated: usize,
}

/// One line of the manual attendance sheet for a meeting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetRow {
    pub student: Student,
    /// `None` when no record exists (reads as Absent)
    pub status: Option<AttendanceStatus>,
    pub scan_time: Option<DateTime<Utc>>,
}

/// Present up to and including start + 15 minutes, Late afterwards.
///
/// The start is the activation time, or the scheduled date when the meeting
/// was never activated.
pub fn classify(meeting: &Meeting, now: DateTime<Utc>) -> AttendanceStatus {
    let start = meeting.start_time.unwrap_or(meeting.meeting_date);
    if now <= start + Duration::minutes(LATE_THRESHOLD_MINUTES) {
        AttendanceStatus::Present
    } else {
        AttendanceStatus::Late
    }
}

impl AttendanceService {
    /// Self check-in by `user_id` with the token read from the QR code.
    ///
    /// Checks run in order and the first failure ends the attempt:
    /// active, not expired, token valid, not already marked.
    pub fn scan(&self, meeting_id: i64, presented_token: &str, user_id: i64) -> Result<ScanOutcome, AttendanceError> {
        let meeting = self
            .db
            .find_meeting(meeting_id)?
            .ok_or(AttendanceError::MeetingNotFound { meeting_id })?;
        let now = self.now();

        let outcome = self.check_and_record(&meeting, presented_token, user_id, now)?;
        match outcome {
            ScanOutcome::Marked(status) => info!(
                "User {} marked {} for meeting {}",
                user_id,
                status.label(),
                meeting_id
            ),
            other => warn!(
                "Scan by user {} for meeting {} rejected: {}",
                user_id,
                meeting_id,
                other.message()
            ),
        }
        Ok(outcome)
    }

    fn check_and_record(
        &self,
        meeting: &Meeting,
        presented_token: &str,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ScanOutcome, AttendanceError> {
        if meeting.status != MeetingStatus::Active {
            return Ok(ScanOutcome::NotActive);
        }

        let expiry = match meeting.qr_expiry {
            Some(expiry) if expiry > now => expiry,
            _ => return Ok(ScanOutcome::Expired),
        };

        if !self.signer.validate(meeting.meeting_id, presented_token, expiry) {
            return Ok(ScanOutcome::InvalidToken);
        }

        if let Some(existing) = self.db.get_attendance(meeting.meeting_id, user_id)? {
            return Ok(ScanOutcome::AlreadyMarked(existing.status));
        }

        let status = classify(meeting, now);
        if self.db.insert_scan_record(meeting.meeting_id, user_id, status, now)? {
            return Ok(ScanOutcome::Marked(status));
        }

        // Lost a race with a concurrent scan for the same pair.
        let existing = self
            .db
            .get_attendance(meeting.meeting_id, user_id)?
            .map(|r| r.status)
            .unwrap_or(status);
        debug!("Concurrent scan for meeting {} user {}", meeting.meeting_id, user_id);
        Ok(ScanOutcome::AlreadyMarked(existing))
    }

    /// Instructor bulk entry: `user_id -> status code`, where 0 means leave unchanged.
    ///
    /// Every code is checked before anything is written.
    pub fn save_manual_attendance(
        &self,
        activity_id: i64,
        meeting_id: i64,
        entries: &BTreeMap<i64, i64>,
    ) -> Result<ManualSaveSummary, AttendanceError> {
        self.db.get_meeting(activity_id, meeting_id)?;

        let mut requested = Vec::with_capacity(entries.len());
        for (&user_id, &code) in entries {
            if code == 0 {
                continue;
            }
            let status =
                AttendanceStatus::from_code(code).ok_or(AttendanceError::InvalidStatusCode { user_id, code })?;
            requested.push((user_id, status));
        }

        let now = self.now();
        let mut summary = ManualSaveSummary::default();
        for (user_id, status) in requested {
            match self.db.upsert_manual_record(meeting_id, user_id, status, now)? {
                ManualWrite::Saved => summary.saved += 1,
                ManualWrite::Updated => summary.updated += 1,
            }
        }

        info!(
            "Manual attendance for meeting {}: {} saved, {} updated",
            meeting_id, summary.saved, summary.updated
        );
        Ok(summary)
    }

    /// Roster joined with each student's current record for one meeting.
    pub fn attendance_sheet(&self, activity_id: i64, meeting_id: i64) -> Result<Vec<SheetRow>, AttendanceError> {
        self.db.get_meeting(activity_id, meeting_id)?;
        let records: BTreeMap<i64, _> = self
            .db
            .list_attendance_for_meeting(meeting_id)?
            .into_iter()
            .map(|r| (r.user_id, r))
            .collect();

        let rows = self
            .db
            .enrolled_students(activity_id)?
            .into_iter()
            .map(|student| {
                let record = records.get(&student.user_id);
                SheetRow {
                    status: record.map(|r| r.status),
                    scan_time: record.and_then(|r| r.scan_time),
                    student,
                }
            })
            .collect();
        Ok(rows)
    }
}
