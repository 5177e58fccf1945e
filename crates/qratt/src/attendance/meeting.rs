//! Meeting state machine: `Inactive -> Active -> Ended`.
//!
//! Only one meeting per activity may be `Active`. Activation ends any other
//! active meeting of the same activity every time it is applied. While a
//! meeting is active its QR code is re-issued whenever the display surface is
//! read after the stored expiry has passed.

use super::error::AttendanceError;
use super::status::MeetingStatus;
use super::token::{self, QrTokenSigner};
use super::AttendanceService;
use crate::db::{Meeting, MeetingDetails};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Highest meeting number accepted by the add/edit form.
pub const MAX_MEETING_NUMBER: i64 = 16;

/// Whether a requested transition changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Applied,
    /// The meeting was not in the required state; nothing was written
    Ignored,
}

/// What the QR display surface shows for an active meeting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrDisplay {
    pub meeting_id: i64,
    pub meeting_number: i64,
    pub topic: String,
    pub payload_url: String,
    pub image_url: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in_secs: i64,
    /// True when this read re-issued the code
    pub refreshed: bool,
}

/// `Inactive -> Active`: stamps the start time and issues the first QR code.
pub fn begin(meeting: &mut Meeting, now: DateTime<Utc>, signer: &QrTokenSigner, base_url: &str) -> Transition {
    if meeting.status != MeetingStatus::Inactive {
        return Transition::Ignored;
    }
    meeting.status = MeetingStatus::Active;
    meeting.start_time = Some(now);
    issue_qr(meeting, now, signer, base_url);
    Transition::Applied
}

/// `Active -> Ended`: stamps the end time.
pub fn finish(meeting: &mut Meeting, now: DateTime<Utc>) -> Transition {
    if meeting.status != MeetingStatus::Active {
        return Transition::Ignored;
    }
    meeting.status = MeetingStatus::Ended;
    meeting.end_time = Some(now);
    meeting.modified_at = now;
    Transition::Applied
}

/// Re-issues the QR code of an active meeting if it is missing or expired.
///
/// Returns true if a new code was issued.
pub fn refresh_qr(meeting: &mut Meeting, now: DateTime<Utc>, signer: &QrTokenSigner, base_url: &str) -> bool {
    if meeting.status != MeetingStatus::Active {
        return false;
    }
    let stale = match (&meeting.qr_code, meeting.qr_expiry) {
        (Some(_), Some(expiry)) => expiry <= now,
        _ => true,
    };
    if stale {
        issue_qr(meeting, now, signer, base_url);
    }
    stale
}

fn issue_qr(meeting: &mut Meeting, now: DateTime<Utc>, signer: &QrTokenSigner, base_url: &str) {
    let expiry = token::next_expiry(now);
    let qr_token = signer.generate(meeting.meeting_id, expiry);
    meeting.qr_expiry = Some(expiry);
    meeting.qr_code = Some(token::payload_url(base_url, &qr_token, meeting.meeting_id));
    meeting.modified_at = now;
}

fn validate_details(details: &MeetingDetails) -> Result<MeetingDetails, AttendanceError> {
    if !(1..=MAX_MEETING_NUMBER).contains(&details.meeting_number) {
        return Err(AttendanceError::InvalidMeetingNumber {
            meeting_number: details.meeting_number,
            max: MAX_MEETING_NUMBER,
        });
    }
    let topic = details.topic.trim();
    if topic.is_empty() {
        return Err(AttendanceError::EmptyTopic);
    }
    Ok(MeetingDetails {
        meeting_number: details.meeting_number,
        topic: topic.to_string(),
        meeting_date: details.meeting_date,
    })
}

impl AttendanceService {
    /// Creates an `Inactive` meeting.
    pub fn add_meeting(&self, activity_id: i64, details: &MeetingDetails) -> Result<Meeting, AttendanceError> {
        let details = validate_details(details)?;
        let meeting = self.db.insert_meeting(activity_id, &details, self.now())?;
        info!(
            "Meeting {} (#{}) created in activity {}",
            meeting.meeting_id, meeting.meeting_number, activity_id
        );
        Ok(meeting)
    }

    /// Changes number, topic and date in any state.
    pub fn edit_meeting(
        &self,
        activity_id: i64,
        meeting_id: i64,
        details: &MeetingDetails,
    ) -> Result<Meeting, AttendanceError> {
        self.db.get_meeting(activity_id, meeting_id)?;
        let details = validate_details(details)?;
        self.db.update_meeting_details(meeting_id, &details, self.now())?;
        info!("Meeting {} updated", meeting_id);
        self.db.get_meeting(activity_id, meeting_id)
    }

    /// Activates an inactive meeting, ending any other active meeting of the activity.
    pub fn activate_meeting(&self, activity_id: i64, meeting_id: i64) -> Result<(Transition, Meeting), AttendanceError> {
        let mut meeting = self.db.get_meeting(activity_id, meeting_id)?;
        if meeting.status != MeetingStatus::Inactive {
            warn!(
                "Ignoring activation of meeting {} in state {}",
                meeting_id,
                meeting.status.label()
            );
            return Ok((Transition::Ignored, meeting));
        }

        let transition = begin(&mut meeting, self.now(), &self.signer, &self.base_url);
        let ended = self.db.save_activation(&meeting)?;

        info!(
            "Meeting {} activated (ended {} other active meeting(s)), QR expires at {:?}",
            meeting_id, ended, meeting.qr_expiry
        );
        Ok((transition, meeting))
    }

    /// Ends an active meeting. Any other state is left alone.
    pub fn end_meeting(&self, activity_id: i64, meeting_id: i64) -> Result<(Transition, Meeting), AttendanceError> {
        let mut meeting = self.db.get_meeting(activity_id, meeting_id)?;
        let transition = finish(&mut meeting, self.now());
        match transition {
            Transition::Applied => {
                self.db.save_meeting_state(&meeting)?;
                info!("Meeting {} ended", meeting_id);
            }
            Transition::Ignored => warn!(
                "Ignoring end of meeting {} in state {}",
                meeting_id,
                meeting.status.label()
            ),
        }
        Ok((transition, meeting))
    }

    /// Reads the QR display surface, rotating the code when it has expired.
    ///
    /// Returns `None` when the meeting is not active.
    pub fn qr_display(
        &self,
        activity_id: i64,
        meeting_id: i64,
        image_service: &str,
    ) -> Result<Option<QrDisplay>, AttendanceError> {
        let mut meeting = self.db.get_meeting(activity_id, meeting_id)?;
        if meeting.status != MeetingStatus::Active {
            return Ok(None);
        }

        let now = self.now();
        let refreshed = refresh_qr(&mut meeting, now, &self.signer, &self.base_url);
        if refreshed {
            self.db.save_meeting_state(&meeting)?;
            info!("QR code for meeting {} rotated", meeting_id);
        }

        let (Some(payload_url), Some(expires_at)) = (meeting.qr_code, meeting.qr_expiry) else {
            return Ok(None);
        };
        let image_url = token::qr_image_url(image_service, &payload_url)?;

        Ok(Some(QrDisplay {
            meeting_id,
            meeting_number: meeting.meeting_number,
            topic: meeting.topic,
            payload_url,
            image_url,
            expires_at,
            expires_in_secs: (expires_at - now).num_seconds().max(0),
            refreshed,
        }))
    }

    /// Deletes a meeting and all of its attendance records in any state.
    ///
    /// Returns the number of attendance records removed.
    pub fn delete_meeting(&self, activity_id: i64, meeting_id: i64) -> Result<usize, AttendanceError> {
        self.db.get_meeting(activity_id, meeting_id)?;
        let removed = self.db.delete_meeting(meeting_id)?;
        info!("Meeting {} deleted with {} attendance record(s)", meeting_id, removed);
        Ok(removed)
    }

    pub fn list_meetings(&self, activity_id: i64) -> Result<Vec<Meeting>, AttendanceError> {
        self.db.get_activity(activity_id)?;
        self.db.list_meetings(activity_id)
    }

    /// Meetings a student can currently scan into.
    pub fn active_meetings(&self, activity_id: i64) -> Result<Vec<Meeting>, AttendanceError> {
        self.db.get_activity(activity_id)?;
        self.db.list_active_meetings(activity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::AttendanceDb;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    const BASE: &str = "https://lms.test/mod/qratt";
    const IMAGES: &str = "https://api.qrserver.com/v1/create-qr-code/?size=400x400";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap()
    }

    fn setup() -> (AttendanceService, Arc<ManualClock>, i64) {
        let clock = Arc::new(ManualClock::new(t0()));
        let db = AttendanceDb::open_in_memory().unwrap();
        let activity = db.create_activity("Algorithms", t0()).unwrap();
        let service = AttendanceService::new(db, clock.clone(), QrTokenSigner::new(Some("pepper")), BASE);
        (service, clock, activity.activity_id)
    }

    fn details(number: i64) -> MeetingDetails {
        MeetingDetails {
            meeting_number: number,
            topic: format!("Week {number}"),
            meeting_date: t0(),
        }
    }

    #[test]
    fn activation_issues_qr_and_start_time() {
        let (service, _clock, activity) = setup();
        let m = service.add_meeting(activity, &details(1)).unwrap();
        assert_eq!(m.status, MeetingStatus::Inactive);
        assert!(m.qr_code.is_none() && m.qr_expiry.is_none());

        let (t, m) = service.activate_meeting(activity, m.meeting_id).unwrap();
        assert_eq!(t, Transition::Applied);
        assert_eq!(m.status, MeetingStatus::Active);
        assert_eq!(m.start_time, Some(t0()));
        assert_eq!(m.qr_expiry, Some(t0() + Duration::seconds(60)));

        let token = service.signer().generate(m.meeting_id, t0() + Duration::seconds(60));
        assert_eq!(
            m.qr_code.as_deref(),
            Some(format!("{BASE}/scan?token={token}&meeting={}", m.meeting_id).as_str())
        );

        let stored = service.db().get_meeting(activity, m.meeting_id).unwrap();
        assert_eq!(stored, m);
    }

    #[test]
    fn activating_b_ends_a() {
        let (service, clock, activity) = setup();
        let a = service.add_meeting(activity, &details(1)).unwrap();
        let b = service.add_meeting(activity, &details(2)).unwrap();

        service.activate_meeting(activity, a.meeting_id).unwrap();
        clock.advance(Duration::minutes(50));
        service.activate_meeting(activity, b.meeting_id).unwrap();

        let a = service.db().get_meeting(activity, a.meeting_id).unwrap();
        let b = service.db().get_meeting(activity, b.meeting_id).unwrap();
        assert_eq!(a.status, MeetingStatus::Ended);
        assert_eq!(a.end_time, Some(t0() + Duration::minutes(50)));
        assert_eq!(b.status, MeetingStatus::Active);
        assert_eq!(service.active_meetings(activity).unwrap().len(), 1);
    }

    #[test]
    fn activation_only_from_inactive() {
        let (service, _clock, activity) = setup();
        let m = service.add_meeting(activity, &details(1)).unwrap();
        service.activate_meeting(activity, m.meeting_id).unwrap();

        let (t, _) = service.activate_meeting(activity, m.meeting_id).unwrap();
        assert_eq!(t, Transition::Ignored);

        service.end_meeting(activity, m.meeting_id).unwrap();
        let (t, after) = service.activate_meeting(activity, m.meeting_id).unwrap();
        assert_eq!(t, Transition::Ignored);
        assert_eq!(after.status, MeetingStatus::Ended);
    }

    #[test]
    fn end_is_noop_unless_active() {
        let (service, clock, activity) = setup();
        let m = service.add_meeting(activity, &details(1)).unwrap();

        let (t, still) = service.end_meeting(activity, m.meeting_id).unwrap();
        assert_eq!(t, Transition::Ignored);
        assert_eq!(still.status, MeetingStatus::Inactive);
        assert_eq!(still.end_time, None);

        service.activate_meeting(activity, m.meeting_id).unwrap();
        clock.advance(Duration::minutes(90));
        let (t, ended) = service.end_meeting(activity, m.meeting_id).unwrap();
        assert_eq!(t, Transition::Applied);
        assert_eq!(ended.end_time, Some(t0() + Duration::minutes(90)));
        assert_eq!(ended.modified_at, t0() + Duration::minutes(90));
    }

    #[test]
    fn qr_refresh_is_idempotent_within_window() {
        let (service, clock, activity) = setup();
        let m = service.add_meeting(activity, &details(1)).unwrap();
        service.activate_meeting(activity, m.meeting_id).unwrap();

        clock.advance(Duration::seconds(30));
        let first = service.qr_display(activity, m.meeting_id, IMAGES).unwrap().unwrap();
        assert!(!first.refreshed);
        assert_eq!(first.expires_in_secs, 30);

        clock.advance(Duration::seconds(29));
        let second = service.qr_display(activity, m.meeting_id, IMAGES).unwrap().unwrap();
        assert_eq!(second.payload_url, first.payload_url);

        clock.advance(Duration::seconds(1));
        let rotated = service.qr_display(activity, m.meeting_id, IMAGES).unwrap().unwrap();
        assert!(rotated.refreshed);
        assert_ne!(rotated.payload_url, first.payload_url);
        assert_eq!(rotated.expires_at, t0() + Duration::seconds(120));
        assert_eq!(rotated.expires_in_secs, 60);

        let stored = service.db().get_meeting(activity, m.meeting_id).unwrap();
        assert_eq!(stored.status, MeetingStatus::Active);
        assert_eq!(stored.qr_code.as_deref(), Some(rotated.payload_url.as_str()));
    }

    #[test]
    fn deleting_active_meeting_cascades_records() {
        use crate::attendance::AttendanceStatus;

        let (service, _clock, activity) = setup();
        let live = service.add_meeting(activity, &details(1)).unwrap();
        let other = service.add_meeting(activity, &details(2)).unwrap();
        service.activate_meeting(activity, live.meeting_id).unwrap();
        for user in [7, 8] {
            service
                .db()
                .insert_scan_record(live.meeting_id, user, AttendanceStatus::Present, t0())
                .unwrap();
        }
        service
            .db()
            .insert_scan_record(other.meeting_id, 7, AttendanceStatus::Late, t0())
            .unwrap();

        assert_eq!(service.delete_meeting(activity, live.meeting_id).unwrap(), 2);
        assert!(service.db().find_meeting(live.meeting_id).unwrap().is_none());
        assert!(service.db().list_attendance_for_meeting(live.meeting_id).unwrap().is_empty());
        assert!(service.active_meetings(activity).unwrap().is_empty());
        assert_eq!(service.db().list_attendance_for_meeting(other.meeting_id).unwrap().len(), 1);
    }

    #[test]
    fn qr_display_requires_active() {
        let (service, _clock, activity) = setup();
        let m = service.add_meeting(activity, &details(1)).unwrap();
        assert_eq!(service.qr_display(activity, m.meeting_id, IMAGES).unwrap(), None);
    }

    #[test]
    fn edit_keeps_state_and_rejects_collisions() {
        let (service, clock, activity) = setup();
        let a = service.add_meeting(activity, &details(1)).unwrap();
        service.add_meeting(activity, &details(2)).unwrap();
        let (_, active) = service.activate_meeting(activity, a.meeting_id).unwrap();

        let clash = service.edit_meeting(activity, a.meeting_id, &details(2));
        assert_eq!(
            clash,
            Err(AttendanceError::DuplicateMeetingNumber { meeting_number: 2 })
        );

        clock.advance(Duration::minutes(1));
        let edited = service
            .edit_meeting(
                activity,
                a.meeting_id,
                &MeetingDetails {
                    meeting_number: 1,
                    topic: "  Graphs  ".into(),
                    meeting_date: t0() + Duration::days(1),
                },
            )
            .unwrap();
        assert_eq!(edited.topic, "Graphs");
        assert_eq!(edited.status, MeetingStatus::Active);
        assert_eq!(edited.qr_code, active.qr_code);
        assert_eq!(edited.qr_expiry, active.qr_expiry);
    }

    #[test]
    fn form_validation() {
        let (service, _clock, activity) = setup();
        assert!(matches!(
            service.add_meeting(activity, &details(0)),
            Err(AttendanceError::InvalidMeetingNumber { .. })
        ));
        assert!(matches!(
            service.add_meeting(activity, &details(17)),
            Err(AttendanceError::InvalidMeetingNumber { .. })
        ));
        let blank = MeetingDetails {
            topic: "   ".into(),
            ..details(3)
        };
        assert_eq!(service.add_meeting(activity, &blank), Err(AttendanceError::EmptyTopic));
        assert!(service.add_meeting(999, &details(1)).unwrap_err().is_not_found());
    }

    #[test]
    fn meeting_of_other_activity_is_not_found() {
        let (service, _clock, activity) = setup();
        let other = service.db().create_activity("Networks", t0()).unwrap();
        let m = service.add_meeting(activity, &details(1)).unwrap();
        assert_eq!(
            service.activate_meeting(other.activity_id, m.meeting_id).unwrap_err(),
            AttendanceError::MeetingNotFound {
                meeting_id: m.meeting_id
            }
        );
    }
}
