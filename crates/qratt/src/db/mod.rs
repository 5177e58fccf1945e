/// Database module for activities, meetings and attendance records

mod types;

pub use types::{Activity, AttendanceRecord, ManualWrite, Meeting, MeetingDetails, Student};

use crate::attendance::{default_catalogue, AttendanceError, AttendanceStatus, MeetingStatus, StatusDefinition};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const SCHEMA_SQL: &str = include_str!("../../sql/init_qratt.sql");

const MEETING_COLUMNS: &str = "meeting_id, activity_id, meeting_number, topic, meeting_date, status,
     start_time, end_time, qr_code, qr_expiry, created_at, modified_at";

const ATTENDANCE_COLUMNS: &str = "meeting_id, user_id, status, scan_time, created_at, modified_at";

/// Source of the enrolled-student roster for an activity.
///
/// The roster belongs to the host environment; only users holding the
/// student role are returned, ordered by last name then first name.
pub trait Roster {
    fn enrolled_students(&self, activity_id: i64) -> Result<Vec<Student>, AttendanceError>;
}

pub struct AttendanceDb {
    db: Mutex<Connection>,
}

impl AttendanceDb {
    /// Opens (or creates) the database at `db_path` and initializes the schema
    pub fn open(db_path: &str) -> Result<Self, AttendanceError> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    /// Creates a private in-memory database
    pub fn open_in_memory() -> Result<Self, AttendanceError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AttendanceError> {
        conn.execute_batch(SCHEMA_SQL)?;

        for def in default_catalogue() {
            conn.execute(
                "INSERT OR IGNORE INTO attendance_statuses (status_value, description, grade, visible, sort_order)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![def.status.code(), def.label, def.grade, def.visible, def.sort_order],
            )?;
        }

        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---------------------------------------------------------------------
    // Activities
    // ---------------------------------------------------------------------

    pub fn create_activity(&self, name: &str, now: DateTime<Utc>) -> Result<Activity, AttendanceError> {
        let db = self.conn();
        db.execute(
            "INSERT INTO activities (name, created_at, modified_at) VALUES (?1, ?2, ?2)",
            params![name, now],
        )?;
        let activity_id = db.last_insert_rowid();
        info!("Created activity {} ({})", activity_id, name);

        Ok(Activity {
            activity_id,
            name: name.to_string(),
            created_at: now,
            modified_at: now,
        })
    }

    pub fn get_activity(&self, activity_id: i64) -> Result<Activity, AttendanceError> {
        let db = self.conn();
        db.query_row(
            "SELECT activity_id, name, created_at, modified_at FROM activities WHERE activity_id = ?",
            [activity_id],
            |row| {
                Ok(Activity {
                    activity_id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                    modified_at: row.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or(AttendanceError::ActivityNotFound { activity_id })
    }

    pub fn rename_activity(
        &self,
        activity_id: i64,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Activity, AttendanceError> {
        let changed = self.conn().execute(
            "UPDATE activities SET name = ?1, modified_at = ?2 WHERE activity_id = ?3",
            params![name, now, activity_id],
        )?;
        if changed == 0 {
            return Err(AttendanceError::ActivityNotFound { activity_id });
        }
        self.get_activity(activity_id)
    }

    /// Deletes an activity with all of its meetings, their records and its roster.
    ///
    /// Returns the number of meetings removed.
    pub fn delete_activity(&self, activity_id: i64) -> Result<usize, AttendanceError> {
        self.get_activity(activity_id)?;

        let db = self.conn();
        let records = db.execute(
            "DELETE FROM attendance WHERE meeting_id IN
                (SELECT meeting_id FROM meetings WHERE activity_id = ?)",
            [activity_id],
        )?;
        let meetings = db.execute("DELETE FROM meetings WHERE activity_id = ?", [activity_id])?;
        db.execute("DELETE FROM enrolments WHERE activity_id = ?", [activity_id])?;
        db.execute("DELETE FROM activities WHERE activity_id = ?", [activity_id])?;

        info!(
            "Deleted activity {} ({} meetings, {} attendance records)",
            activity_id, meetings, records
        );
        Ok(meetings)
    }

    // ---------------------------------------------------------------------
    // Meetings
    // ---------------------------------------------------------------------

    /// Inserts an `Inactive` meeting. The (activity, number) pair is unique in storage.
    pub fn insert_meeting(
        &self,
        activity_id: i64,
        details: &MeetingDetails,
        now: DateTime<Utc>,
    ) -> Result<Meeting, AttendanceError> {
        self.get_activity(activity_id)?;

        let db = self.conn();
        db.execute(
            "INSERT INTO meetings (activity_id, meeting_number, topic, meeting_date, status, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                activity_id,
                details.meeting_number,
                details.topic,
                details.meeting_date,
                MeetingStatus::Inactive.code(),
                now
            ],
        )
        .map_err(|e| duplicate_number_or(e, details.meeting_number))?;

        let meeting_id = db.last_insert_rowid();
        Ok(Meeting {
            meeting_id,
            activity_id,
            meeting_number: details.meeting_number,
            topic: details.topic.clone(),
            meeting_date: details.meeting_date,
            status: MeetingStatus::Inactive,
            start_time: None,
            end_time: None,
            qr_code: None,
            qr_expiry: None,
            created_at: now,
            modified_at: now,
        })
    }

    /// Rewrites number, topic and date. Status and QR fields are untouched.
    pub fn update_meeting_details(
        &self,
        meeting_id: i64,
        details: &MeetingDetails,
        now: DateTime<Utc>,
    ) -> Result<(), AttendanceError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE meetings SET meeting_number = ?1, topic = ?2, meeting_date = ?3, modified_at = ?4
                 WHERE meeting_id = ?5",
                params![
                    details.meeting_number,
                    details.topic,
                    details.meeting_date,
                    now,
                    meeting_id
                ],
            )
            .map_err(|e| duplicate_number_or(e, details.meeting_number))?;

        if changed == 0 {
            return Err(AttendanceError::MeetingNotFound { meeting_id });
        }
        Ok(())
    }

    /// Persists the state-machine fields of `meeting`.
    pub fn save_meeting_state(&self, meeting: &Meeting) -> Result<(), AttendanceError> {
        write_meeting_state(&self.conn(), meeting)
    }

    /// Persists a just-activated `meeting`, first forcing every other `Active`
    /// meeting of its activity into `Ended`.
    ///
    /// Both writes happen in one transaction under one lock, so concurrent
    /// activations leave exactly one meeting active. Returns the number of
    /// meetings ended.
    pub fn save_activation(&self, meeting: &Meeting) -> Result<usize, AttendanceError> {
        let db = self.conn();
        let tx = db.unchecked_transaction()?;
        let now = meeting.modified_at;

        let ended = tx.execute(
            "UPDATE meetings SET status = ?1, end_time = COALESCE(end_time, ?2), modified_at = ?2
             WHERE activity_id = ?3 AND status = ?4 AND meeting_id != ?5",
            params![
                MeetingStatus::Ended.code(),
                now,
                meeting.activity_id,
                MeetingStatus::Active.code(),
                meeting.meeting_id
            ],
        )?;
        write_meeting_state(&tx, meeting)?;
        tx.commit()?;

        if ended > 0 {
            debug!(
                "Ended {} previously active meeting(s) in activity {}",
                ended, meeting.activity_id
            );
        }
        Ok(ended)
    }

    /// Gets a meeting that must belong to `activity_id`
    pub fn get_meeting(&self, activity_id: i64, meeting_id: i64) -> Result<Meeting, AttendanceError> {
        match self.find_meeting(meeting_id)? {
            Some(m) if m.activity_id == activity_id => Ok(m),
            _ => Err(AttendanceError::MeetingNotFound { meeting_id }),
        }
    }

    pub fn find_meeting(&self, meeting_id: i64) -> Result<Option<Meeting>, AttendanceError> {
        let db = self.conn();
        let meeting = db
            .query_row(
                &format!("SELECT {MEETING_COLUMNS} FROM meetings WHERE meeting_id = ?"),
                [meeting_id],
                meeting_from_row,
            )
            .optional()?;
        Ok(meeting)
    }

    /// Gets all meetings of an activity ordered by meeting number
    pub fn list_meetings(&self, activity_id: i64) -> Result<Vec<Meeting>, AttendanceError> {
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {MEETING_COLUMNS} FROM meetings WHERE activity_id = ? ORDER BY meeting_number"
        ))?;
        let meetings = stmt
            .query_map([activity_id], meeting_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(meetings)
    }

    pub fn list_active_meetings(&self, activity_id: i64) -> Result<Vec<Meeting>, AttendanceError> {
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {MEETING_COLUMNS} FROM meetings WHERE activity_id = ?1 AND status = ?2
             ORDER BY meeting_number"
        ))?;
        let meetings = stmt
            .query_map(params![activity_id, MeetingStatus::Active.code()], meeting_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(meetings)
    }

    /// Deletes a meeting after deleting its attendance records.
    ///
    /// Returns the number of attendance records removed.
    pub fn delete_meeting(&self, meeting_id: i64) -> Result<usize, AttendanceError> {
        let db = self.conn();
        let records = db.execute("DELETE FROM attendance WHERE meeting_id = ?", [meeting_id])?;
        let meetings = db.execute("DELETE FROM meetings WHERE meeting_id = ?", [meeting_id])?;
        if meetings == 0 {
            return Err(AttendanceError::MeetingNotFound { meeting_id });
        }
        Ok(records)
    }

    // ---------------------------------------------------------------------
    // Attendance
    // ---------------------------------------------------------------------

    pub fn get_attendance(
        &self,
        meeting_id: i64,
        user_id: i64,
    ) -> Result<Option<AttendanceRecord>, AttendanceError> {
        let db = self.conn();
        let record = db
            .query_row(
                &format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE meeting_id = ?1 AND user_id = ?2"),
                params![meeting_id, user_id],
                attendance_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Inserts a self-scan record. Never overwrites.
    ///
    /// Returns `false` when storage already holds a record for the pair.
    pub fn insert_scan_record(
        &self,
        meeting_id: i64,
        user_id: i64,
        status: AttendanceStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, AttendanceError> {
        let result = self.conn().execute(
            "INSERT INTO attendance (meeting_id, user_id, status, scan_time, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?4, ?4)",
            params![meeting_id, user_id, status.code(), now],
        );

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes an instructor-entered status, overwriting any existing record.
    pub fn upsert_manual_record(
        &self,
        meeting_id: i64,
        user_id: i64,
        status: AttendanceStatus,
        now: DateTime<Utc>,
    ) -> Result<ManualWrite, AttendanceError> {
        let scan_time = status.is_attended().then_some(now);
        let db = self.conn();

        let updated = db.execute(
            "UPDATE attendance SET status = ?1, scan_time = ?2, modified_at = ?3
             WHERE meeting_id = ?4 AND user_id = ?5",
            params![status.code(), scan_time, now, meeting_id, user_id],
        )?;
        if updated > 0 {
            return Ok(ManualWrite::Updated);
        }

        // A record inserted concurrently between the two statements is overwritten.
        let inserted = db.execute(
            "INSERT INTO attendance (meeting_id, user_id, status, scan_time, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT (meeting_id, user_id) DO UPDATE
                SET status = excluded.status, scan_time = excluded.scan_time, modified_at = excluded.modified_at",
            params![meeting_id, user_id, status.code(), scan_time, now],
        )?;
        debug!("Manual insert for meeting {} user {} ({} row)", meeting_id, user_id, inserted);
        Ok(ManualWrite::Saved)
    }

    pub fn list_attendance_for_meeting(&self, meeting_id: i64) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE meeting_id = ? ORDER BY user_id"
        ))?;
        let records = stmt
            .query_map([meeting_id], attendance_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Gets all attendance records for every meeting of an activity
    pub fn list_attendance_for_activity(
        &self,
        activity_id: i64,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        let db = self.conn();
        let mut stmt = db.prepare(
            "SELECT a.meeting_id, a.user_id, a.status, a.scan_time, a.created_at, a.modified_at
             FROM attendance a
             JOIN meetings m ON a.meeting_id = m.meeting_id
             WHERE m.activity_id = ?
             ORDER BY a.meeting_id, a.user_id",
        )?;
        let records = stmt
            .query_map([activity_id], attendance_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    // ---------------------------------------------------------------------
    // Status catalogue and roster
    // ---------------------------------------------------------------------

    pub fn list_statuses(&self) -> Result<Vec<StatusDefinition>, AttendanceError> {
        let db = self.conn();
        let mut stmt = db.prepare(
            "SELECT status_value, description, grade, visible, sort_order
             FROM attendance_statuses ORDER BY sort_order, status_value",
        )?;
        let statuses = stmt
            .query_map([], |row| {
                let code: i64 = row.get(0)?;
                Ok(StatusDefinition {
                    status: attendance_status(code, 0)?,
                    label: row.get(1)?,
                    grade: row.get(2)?,
                    visible: row.get(3)?,
                    sort_order: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(statuses)
    }

    /// Mirrors a host enrolment into the local roster table.
    pub fn enrol(&self, activity_id: i64, student: &Student, role: &str) -> Result<(), AttendanceError> {
        self.get_activity(activity_id)?;
        self.conn().execute(
            "INSERT INTO enrolments (activity_id, user_id, first_name, last_name, email, role)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (activity_id, user_id) DO UPDATE
                SET first_name = excluded.first_name, last_name = excluded.last_name,
                    email = excluded.email, role = excluded.role",
            params![
                activity_id,
                student.user_id,
                student.first_name,
                student.last_name,
                student.email,
                role
            ],
        )?;
        Ok(())
    }
}

impl Roster for AttendanceDb {
    fn enrolled_students(&self, activity_id: i64) -> Result<Vec<Student>, AttendanceError> {
        let db = self.conn();
        let mut stmt = db.prepare(
            "SELECT user_id, first_name, last_name, email FROM enrolments
             WHERE activity_id = ? AND role = 'student'
             ORDER BY last_name, first_name, user_id",
        )?;
        let students = stmt
            .query_map([activity_id], |row| {
                Ok(Student {
                    user_id: row.get(0)?,
                    first_name: row.get(1)?,
                    last_name: row.get(2)?,
                    email: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(students)
    }
}

fn write_meeting_state(conn: &Connection, meeting: &Meeting) -> Result<(), AttendanceError> {
    let changed = conn.execute(
        "UPDATE meetings SET status = ?1, start_time = ?2, end_time = ?3, qr_code = ?4,
                qr_expiry = ?5, modified_at = ?6
         WHERE meeting_id = ?7",
        params![
            meeting.status.code(),
            meeting.start_time,
            meeting.end_time,
            meeting.qr_code,
            meeting.qr_expiry,
            meeting.modified_at,
            meeting.meeting_id
        ],
    )?;
    if changed == 0 {
        return Err(AttendanceError::MeetingNotFound {
            meeting_id: meeting.meeting_id,
        });
    }
    Ok(())
}

fn meeting_from_row(row: &Row<'_>) -> rusqlite::Result<Meeting> {
    let status: i64 = row.get(5)?;
    Ok(Meeting {
        meeting_id: row.get(0)?,
        activity_id: row.get(1)?,
        meeting_number: row.get(2)?,
        topic: row.get(3)?,
        meeting_date: row.get(4)?,
        status: MeetingStatus::from_code(status).ok_or_else(|| bad_code(5, status))?,
        start_time: row.get(6)?,
        end_time: row.get(7)?,
        qr_code: row.get(8)?,
        qr_expiry: row.get(9)?,
        created_at: row.get(10)?,
        modified_at: row.get(11)?,
    })
}

fn attendance_from_row(row: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let status: i64 = row.get(2)?;
    Ok(AttendanceRecord {
        meeting_id: row.get(0)?,
        user_id: row.get(1)?,
        status: attendance_status(status, 2)?,
        scan_time: row.get(3)?,
        created_at: row.get(4)?,
        modified_at: row.get(5)?,
    })
}

fn attendance_status(code: i64, column: usize) -> rusqlite::Result<AttendanceStatus> {
    AttendanceStatus::from_code(code).ok_or_else(|| bad_code(column, code))
}

fn bad_code(column: usize, code: i64) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        Type::Integer,
        format!("unknown status code {code}").into(),
    )
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn duplicate_number_or(err: rusqlite::Error, meeting_number: i64) -> AttendanceError {
    if is_unique_violation(&err) {
        AttendanceError::DuplicateMeetingNumber { meeting_number }
    } else {
        err.into()
    }
}
