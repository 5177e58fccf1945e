use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use std::sync::Arc;
use tracing::info;

use crate::attendance::AttendanceError;
use crate::report::ActivityReport;
use crate::server::middleware::identity::Identity;
use crate::server::types::ApiErrorType;
use crate::server::util::json_or_error;
use crate::types::AppState;

fn load(s: &AppState, activity_id: i64) -> Result<ActivityReport, AttendanceError> {
    let db = s.service.db();
    ActivityReport::load(db, db, activity_id)
}

/// GET /activities/:activity_id/reports/overview
pub async fn get_overview(Path(activity_id): Path<i64>, State(s): State<Arc<AppState>>) -> Response {
    info!("GET /activities/{}/reports/overview", activity_id);
    json_or_error(StatusCode::OK, load(&s, activity_id).map(|r| r.overview()))
}

/// GET /activities/:activity_id/reports/by_meeting
pub async fn get_by_meeting(Path(activity_id): Path<i64>, State(s): State<Arc<AppState>>) -> Response {
    info!("GET /activities/{}/reports/by_meeting", activity_id);
    json_or_error(StatusCode::OK, load(&s, activity_id).map(|r| r.meeting_totals()))
}

/// GET /activities/:activity_id/reports/by_student
pub async fn get_by_student(Path(activity_id): Path<i64>, State(s): State<Arc<AppState>>) -> Response {
    info!("GET /activities/{}/reports/by_student", activity_id);
    json_or_error(StatusCode::OK, load(&s, activity_id).map(|r| r.student_totals()))
}

/// GET /activities/:activity_id/reports/csv
pub async fn get_csv(Path(activity_id): Path<i64>, State(s): State<Arc<AppState>>) -> Response {
    info!("GET /activities/{}/reports/csv", activity_id);

    match load(&s, activity_id).and_then(|r| r.to_csv()) {
        Ok(csv) => {
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8"));
            headers.insert(
                CONTENT_DISPOSITION,
                HeaderValue::from_str(&format!(
                    "attachment; filename=\"attendance_{activity_id}.csv\""
                ))
                .unwrap_or(HeaderValue::from_static("attachment")),
            );
            (StatusCode::OK, headers, csv).into_response()
        }
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}

/// GET /activities/:activity_id/summary
/// The caller's own attendance
pub async fn get_summary(
    Path(activity_id): Path<i64>,
    Extension(identity): Extension<Identity>,
    State(s): State<Arc<AppState>>,
) -> Response {
    info!("GET /activities/{}/summary (user {})", activity_id, identity.user_id);
    json_or_error(
        StatusCode::OK,
        load(&s, activity_id).map(|r| r.student_summary(identity.user_id)),
    )
}
