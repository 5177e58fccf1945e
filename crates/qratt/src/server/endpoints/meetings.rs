use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::attendance::{ManualSaveSummary, Transition};
use crate::db::{Meeting, MeetingDetails};
use crate::server::types::ApiErrorType;
use crate::server::util::json_or_error;
use crate::types::AppState;

#[derive(Debug, Deserialize)]
pub struct MeetingForm {
    pub meeting_number: i64,
    pub topic: String,
    pub meeting_date: DateTime<Utc>,
}

impl From<MeetingForm> for MeetingDetails {
    fn from(form: MeetingForm) -> Self {
        MeetingDetails {
            meeting_number: form.meeting_number,
            topic: form.topic,
            meeting_date: form.meeting_date,
        }
    }
}

/// Manual entry submission: user id to status code, 0 leaves the student unchanged.
#[derive(Debug, Deserialize)]
pub struct ManualAttendanceForm {
    pub statuses: BTreeMap<i64, i64>,
}

fn transition_response(result: Result<(Transition, Meeting), crate::attendance::AttendanceError>) -> Response {
    match result {
        Ok((transition, meeting)) => (
            StatusCode::OK,
            Json(json!({ "transition": transition, "meeting": meeting })),
        )
            .into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}

/// GET /activities/:activity_id/meetings
pub async fn get_meetings(Path(activity_id): Path<i64>, State(s): State<Arc<AppState>>) -> Response {
    info!("GET /activities/{}/meetings", activity_id);
    json_or_error(StatusCode::OK, s.service.list_meetings(activity_id))
}

/// GET /activities/:activity_id/meetings/active
/// Meetings currently open for scanning
pub async fn get_active_meetings(Path(activity_id): Path<i64>, State(s): State<Arc<AppState>>) -> Response {
    info!("GET /activities/{}/meetings/active", activity_id);
    json_or_error(StatusCode::OK, s.service.active_meetings(activity_id))
}

/// POST /activities/:activity_id/meetings
pub async fn post_meeting(
    Path(activity_id): Path<i64>,
    State(s): State<Arc<AppState>>,
    Json(form): Json<MeetingForm>,
) -> Response {
    info!("POST /activities/{}/meetings", activity_id);
    json_or_error(
        StatusCode::CREATED,
        s.service.add_meeting(activity_id, &form.into()),
    )
}

/// PUT /activities/:activity_id/meetings/:meeting_id
pub async fn put_meeting(
    Path((activity_id, meeting_id)): Path<(i64, i64)>,
    State(s): State<Arc<AppState>>,
    Json(form): Json<MeetingForm>,
) -> Response {
    info!("PUT /activities/{}/meetings/{}", activity_id, meeting_id);
    json_or_error(
        StatusCode::OK,
        s.service.edit_meeting(activity_id, meeting_id, &form.into()),
    )
}

/// DELETE /activities/:activity_id/meetings/:meeting_id
pub async fn delete_meeting(
    Path((activity_id, meeting_id)): Path<(i64, i64)>,
    State(s): State<Arc<AppState>>,
) -> Response {
    info!("DELETE /activities/{}/meetings/{}", activity_id, meeting_id);

    match s.service.delete_meeting(activity_id, meeting_id) {
        Ok(removed) => (
            StatusCode::OK,
            Json(json!({ "meeting_id": meeting_id, "records_deleted": removed })),
        )
            .into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}

/// POST /activities/:activity_id/meetings/:meeting_id/activate
pub async fn post_activate(
    Path((activity_id, meeting_id)): Path<(i64, i64)>,
    State(s): State<Arc<AppState>>,
) -> Response {
    info!("POST /activities/{}/meetings/{}/activate", activity_id, meeting_id);
    transition_response(s.service.activate_meeting(activity_id, meeting_id))
}

/// POST /activities/:activity_id/meetings/:meeting_id/end
pub async fn post_end(
    Path((activity_id, meeting_id)): Path<(i64, i64)>,
    State(s): State<Arc<AppState>>,
) -> Response {
    info!("POST /activities/{}/meetings/{}/end", activity_id, meeting_id);
    transition_response(s.service.end_meeting(activity_id, meeting_id))
}

/// GET /activities/:activity_id/meetings/:meeting_id/qrcode
/// Polled by the display page; rotates the code once it has expired
pub async fn get_qrcode(
    Path((activity_id, meeting_id)): Path<(i64, i64)>,
    State(s): State<Arc<AppState>>,
) -> Response {
    info!("GET /activities/{}/meetings/{}/qrcode", activity_id, meeting_id);

    match s
        .service
        .qr_display(activity_id, meeting_id, &s.config.qr_image_service)
    {
        Ok(Some(display)) => (StatusCode::OK, Json(display)).into_response(),
        Ok(None) => ApiErrorType::from((
            StatusCode::CONFLICT,
            "Meeting is not active",
            Some(format!("meeting {meeting_id} has no live QR code")),
        ))
        .into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}

/// GET /activities/:activity_id/meetings/:meeting_id/attendance
pub async fn get_attendance_sheet(
    Path((activity_id, meeting_id)): Path<(i64, i64)>,
    State(s): State<Arc<AppState>>,
) -> Response {
    info!("GET /activities/{}/meetings/{}/attendance", activity_id, meeting_id);
    json_or_error(
        StatusCode::OK,
        s.service.attendance_sheet(activity_id, meeting_id),
    )
}

/// POST /activities/:activity_id/meetings/:meeting_id/attendance
pub async fn post_attendance(
    Path((activity_id, meeting_id)): Path<(i64, i64)>,
    State(s): State<Arc<AppState>>,
    Json(form): Json<ManualAttendanceForm>,
) -> Response {
    info!("POST /activities/{}/meetings/{}/attendance", activity_id, meeting_id);

    match s
        .service
        .save_manual_attendance(activity_id, meeting_id, &form.statuses)
    {
        Ok(ManualSaveSummary { saved, updated }) => (
            StatusCode::OK,
            Json(json!({
                "saved": saved,
                "updated": updated,
                "message": format!("Attendance saved: {saved} new, {updated} updated"),
            })),
        )
            .into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}
