//! Read-side rollups over meetings, attendance records and the roster.
//!
//! A missing record reads as Absent. Stored Absent records (manual path) and
//! missing ones are counted the same way everywhere in this module.

use crate::attendance::{AttendanceError, AttendanceStatus, StatusDefinition};
use crate::db::{AttendanceDb, Meeting, Roster, Student};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

/// Leading CSV columns before the per-meeting ones.
const CSV_IDENTITY_HEADERS: [&str; 3] = ["First name", "Last name", "Email"];

/// Trailing CSV columns after the per-meeting ones.
const CSV_TOTAL_HEADERS: [&str; 3] = ["Total present", "Total absent", "Percentage"];

/// Attendance percentage with Excused meetings removed from the denominator.
///
/// Rounded to two decimals; 0 when nothing is left to attend.
pub fn attendance_percentage(attended: usize, meetings: usize, excused: usize) -> f64 {
    let denominator = meetings.saturating_sub(excused);
    if denominator == 0 {
        return 0.0;
    }
    round2(attended as f64 / denominator as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub present: usize,
    pub late: usize,
    pub excused: usize,
    /// Stored Absent plus meetings with no record
    pub absent: usize,
}

impl StatusCounts {
    fn add(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Late => self.late += 1,
            AttendanceStatus::Excused => self.excused += 1,
            AttendanceStatus::Absent => self.absent += 1,
        }
    }

    pub fn attended(&self) -> usize {
        self.present + self.late
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentTotals {
    pub student: Student,
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub meetings: usize,
    pub percentage: f64,
    /// Mean status-catalogue weight over all meetings
    pub grade: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeetingTotals {
    pub meeting_id: i64,
    pub meeting_number: i64,
    pub topic: String,
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub enrolled: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Overview {
    pub meetings: usize,
    pub students: usize,
    /// meetings x students
    pub expected: usize,
    pub present: usize,
    pub late: usize,
    pub excused: usize,
    pub absent: usize,
    pub percentage: f64,
}

/// One student's own status for one meeting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub meeting_id: i64,
    pub meeting_number: i64,
    pub topic: String,
    pub status: AttendanceStatus,
}

/// What a student sees about their own attendance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSummary {
    pub user_id: i64,
    pub rows: Vec<SummaryRow>,
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub attended: usize,
    pub meetings: usize,
    pub percentage: f64,
    pub message: String,
}

/// Snapshot of one activity, loaded once and aggregated in memory.
#[derive(Debug, Clone)]
pub struct ActivityReport {
    activity_id: i64,
    meetings: Vec<Meeting>,
    students: Vec<Student>,
    records: HashMap<(i64, i64), AttendanceStatus>,
    weights: HashMap<AttendanceStatus, f64>,
}

impl ActivityReport {
    /// Loads meetings, records and the catalogue from the store and the roster from `roster`.
    pub fn load(db: &AttendanceDb, roster: &impl Roster, activity_id: i64) -> Result<Self, AttendanceError> {
        db.get_activity(activity_id)?;
        let meetings = db.list_meetings(activity_id)?;
        let students = roster.enrolled_students(activity_id)?;
        let records = db
            .list_attendance_for_activity(activity_id)?
            .into_iter()
            .map(|r| ((r.meeting_id, r.user_id), r.status));

        Ok(Self::from_parts(activity_id, meetings, students, records, db.list_statuses()?))
    }

    pub fn from_parts(
        activity_id: i64,
        meetings: Vec<Meeting>,
        students: Vec<Student>,
        records: impl IntoIterator<Item = ((i64, i64), AttendanceStatus)>,
        catalogue: Vec<StatusDefinition>,
    ) -> Self {
        Self {
            activity_id,
            meetings,
            students,
            records: records.into_iter().collect(),
            weights: catalogue.into_iter().map(|d| (d.status, d.grade)).collect(),
        }
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    fn status_of(&self, meeting_id: i64, user_id: i64) -> AttendanceStatus {
        AttendanceStatus::or_absent(self.records.get(&(meeting_id, user_id)).copied())
    }

    fn counts_for_user(&self, user_id: i64) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for m in &self.meetings {
            counts.add(self.status_of(m.meeting_id, user_id));
        }
        counts
    }

    fn grade_for_user(&self, user_id: i64) -> f64 {
        if self.meetings.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .meetings
            .iter()
            .map(|m| {
                let status = self.status_of(m.meeting_id, user_id);
                self.weights.get(&status).copied().unwrap_or(0.0)
            })
            .sum();
        round2(sum / self.meetings.len() as f64)
    }

    pub fn totals_for(&self, student: &Student) -> StudentTotals {
        let counts = self.counts_for_user(student.user_id);
        StudentTotals {
            student: student.clone(),
            percentage: attendance_percentage(counts.attended(), self.meetings.len(), counts.excused),
            grade: self.grade_for_user(student.user_id),
            meetings: self.meetings.len(),
            counts,
        }
    }

    /// Per-student rollup in roster order.
    pub fn student_totals(&self) -> Vec<StudentTotals> {
        self.students.iter().map(|s| self.totals_for(s)).collect()
    }

    /// Per-meeting rollup over the enrolled students, in meeting-number order.
    pub fn meeting_totals(&self) -> Vec<MeetingTotals> {
        let enrolled = self.students.len();
        self.meetings
            .iter()
            .map(|m| {
                let mut counts = StatusCounts::default();
                for s in &self.students {
                    counts.add(self.status_of(m.meeting_id, s.user_id));
                }
                let percentage = if enrolled == 0 {
                    0.0
                } else {
                    round2(counts.attended() as f64 / enrolled as f64 * 100.0)
                };
                MeetingTotals {
                    meeting_id: m.meeting_id,
                    meeting_number: m.meeting_number,
                    topic: m.topic.clone(),
                    counts,
                    enrolled,
                    percentage,
                }
            })
            .collect()
    }

    pub fn overview(&self) -> Overview {
        let expected = self.meetings.len() * self.students.len();
        let mut counts = StatusCounts::default();
        for m in &self.meetings {
            for s in &self.students {
                counts.add(self.status_of(m.meeting_id, s.user_id));
            }
        }
        let recorded = counts.attended() + counts.excused;
        let percentage = if expected == 0 {
            0.0
        } else {
            round2(counts.attended() as f64 / expected as f64 * 100.0)
        };

        Overview {
            meetings: self.meetings.len(),
            students: self.students.len(),
            expected,
            present: counts.present,
            late: counts.late,
            excused: counts.excused,
            absent: expected - recorded,
            percentage,
        }
    }

    /// Own-status view for `user_id`, including meetings never recorded.
    pub fn student_summary(&self, user_id: i64) -> StudentSummary {
        let rows: Vec<_> = self
            .meetings
            .iter()
            .map(|m| SummaryRow {
                meeting_id: m.meeting_id,
                meeting_number: m.meeting_number,
                topic: m.topic.clone(),
                status: self.status_of(m.meeting_id, user_id),
            })
            .collect();
        let counts = self.counts_for_user(user_id);
        let attended = counts.attended();
        let meetings = rows.len();

        StudentSummary {
            user_id,
            rows,
            attended,
            meetings,
            percentage: attendance_percentage(attended, meetings, counts.excused),
            message: format!("Attended {attended} out of {meetings} meetings"),
            counts,
        }
    }

    /// Writes the export: identity columns, one status label per meeting, then totals.
    pub fn write_csv<W: std::io::Write>(&self, out: W) -> Result<(), AttendanceError> {
        let mut writer = csv::Writer::from_writer(out);

        let mut header: Vec<String> = CSV_IDENTITY_HEADERS.iter().map(|h| h.to_string()).collect();
        header.extend(self.meetings.iter().map(|m| format!("Meeting {}", m.meeting_number)));
        header.extend(CSV_TOTAL_HEADERS.iter().map(|h| h.to_string()));
        writer.write_record(&header)?;

        for totals in self.student_totals() {
            let s = &totals.student;
            let mut row = vec![s.first_name.clone(), s.last_name.clone(), s.email.clone()];
            row.extend(
                self.meetings
                    .iter()
                    .map(|m| self.status_of(m.meeting_id, s.user_id).label().to_string()),
            );
            row.push(totals.counts.attended().to_string());
            row.push(totals.counts.absent.to_string());
            row.push(format!("{}%", totals.percentage));
            writer.write_record(&row)?;
        }

        writer.flush().map_err(|e| AttendanceError::Csv {
            message: e.to_string(),
        })?;
        info!(
            "Exported attendance for activity {} ({} students, {} meetings)",
            self.activity_id,
            self.students.len(),
            self.meetings.len()
        );
        Ok(())
    }

    pub fn to_csv(&self) -> Result<String, AttendanceError> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        String::from_utf8(buf).map_err(|e| AttendanceError::Csv {
            message: e.to_string(),
        })
    }
}
