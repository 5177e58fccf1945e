//! Meeting lifecycle, QR token issuance and attendance recording.
//!
//! [`AttendanceService`] ties the store, the clock and the token signer
//! together; the state machine lives in [`meeting`] and the scan and manual
//! entry paths in [`recorder`].

mod error;
pub mod meeting;
pub mod recorder;
mod status;
pub mod token;

pub use error::AttendanceError;
pub use meeting::{QrDisplay, Transition};
pub use recorder::{ManualSaveSummary, ScanOutcome, SheetRow};
pub use status::{default_catalogue, AttendanceStatus, MeetingStatus, StatusDefinition};
pub use token::QrTokenSigner;

use crate::clock::Clock;
use crate::db::{Activity, AttendanceDb, Roster, Student};
use std::sync::Arc;
use tracing::info;

/// Entry point for every meeting and attendance operation.
pub struct AttendanceService {
    db: AttendanceDb,
    clock: Arc<dyn Clock>,
    signer: QrTokenSigner,
    base_url: String,
}

impl AttendanceService {
    /// # Parameters
    /// - `db`: The store.
    /// - `clock`: Source of "now" for every transition and scan.
    /// - `signer`: QR token signer carrying the installation secret.
    /// - `base_url`: Public URL the QR payload points back to.
    pub fn new(db: AttendanceDb, clock: Arc<dyn Clock>, signer: QrTokenSigner, base_url: &str) -> Self {
        Self {
            db,
            clock,
            signer,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn db(&self) -> &AttendanceDb {
        &self.db
    }

    pub fn signer(&self) -> &QrTokenSigner {
        &self.signer
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    pub fn create_activity(&self, name: &str) -> Result<Activity, AttendanceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AttendanceError::EmptyActivityName);
        }
        self.db.create_activity(name, self.now())
    }

    pub fn rename_activity(&self, activity_id: i64, name: &str) -> Result<Activity, AttendanceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AttendanceError::EmptyActivityName);
        }
        let activity = self.db.rename_activity(activity_id, name, self.now())?;
        info!("Activity {} renamed to {}", activity_id, name);
        Ok(activity)
    }

    /// Removes the activity with its meetings, records and roster. Returns the meeting count.
    pub fn delete_activity(&self, activity_id: i64) -> Result<usize, AttendanceError> {
        self.db.delete_activity(activity_id)
    }

    pub fn enrol(&self, activity_id: i64, student: &Student, role: &str) -> Result<(), AttendanceError> {
        self.db.enrol(activity_id, student, role)?;
        info!("User {} enrolled in activity {} as {}", student.user_id, activity_id, role);
        Ok(())
    }

    /// True when `user_id` holds the student role in the activity's roster.
    pub fn is_enrolled_student(&self, activity_id: i64, user_id: i64) -> Result<bool, AttendanceError> {
        Ok(self
            .db
            .enrolled_students(activity_id)?
            .iter()
            .any(|s| s.user_id == user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn service() -> AttendanceService {
        let start = chrono::Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap();
        AttendanceService::new(
            AttendanceDb::open_in_memory().unwrap(),
            Arc::new(ManualClock::new(start)),
            QrTokenSigner::new(None),
            "http://localhost:8080/",
        )
    }

    #[test]
    fn activity_names_are_trimmed_and_required() {
        let s = service();
        assert_eq!(s.base_url(), "http://localhost:8080");
        assert_eq!(s.create_activity("   "), Err(AttendanceError::EmptyActivityName));

        let a = s.create_activity("  Databases ").unwrap();
        assert_eq!(a.name, "Databases");
        assert_eq!(s.rename_activity(a.activity_id, "DB II").unwrap().name, "DB II");
        assert!(s.rename_activity(a.activity_id + 1, "x").unwrap_err().is_not_found());
    }

    #[test]
    fn enrolment_role_decides_scan_eligibility() {
        let s = service();
        let a = s.create_activity("Databases").unwrap().activity_id;
        let person = |id: i64| Student {
            user_id: id,
            first_name: "P".into(),
            last_name: format!("L{id}"),
            email: format!("{id}@uni.test"),
        };
        s.enrol(a, &person(1), "student").unwrap();
        s.enrol(a, &person(2), "editingteacher").unwrap();

        assert!(s.is_enrolled_student(a, 1).unwrap());
        assert!(!s.is_enrolled_student(a, 2).unwrap());
        assert!(!s.is_enrolled_student(a, 3).unwrap());
    }
}
