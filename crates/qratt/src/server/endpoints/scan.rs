use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::attendance::{token, AttendanceError, ScanOutcome};
use crate::server::middleware::identity::Identity;
use crate::server::types::ApiErrorType;
use crate::types::AppState;

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    pub token: String,
    pub meeting: i64,
}

#[derive(Debug, Deserialize)]
pub struct ScanUrlForm {
    pub url: String,
}

/// GET /scan?token=..&meeting=..
/// Target of the URL encoded in the QR image
pub async fn get_scan(
    Query(query): Query<ScanQuery>,
    Extension(identity): Extension<Identity>,
    State(s): State<Arc<AppState>>,
) -> Response {
    info!("GET /scan (meeting {}, user {})", query.meeting, identity.user_id);
    scan_as(&s, identity, query.meeting, &query.token)
}

/// POST /scan/url
/// Fallback for devices without a camera: the student pastes the QR URL
pub async fn post_scan_url(
    Extension(identity): Extension<Identity>,
    State(s): State<Arc<AppState>>,
    Json(form): Json<ScanUrlForm>,
) -> Response {
    info!("POST /scan/url (user {})", identity.user_id);

    match token::parse_payload_url(&form.url) {
        Ok((presented, meeting_id)) => scan_as(&s, identity, meeting_id, &presented),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}

fn scan_as(s: &AppState, identity: Identity, meeting_id: i64, presented: &str) -> Response {
    let meeting = match s.service.db().find_meeting(meeting_id) {
        Ok(Some(m)) => m,
        Ok(None) => return ApiErrorType::from(AttendanceError::MeetingNotFound { meeting_id }).into_response(),
        Err(e) => return ApiErrorType::from(e).into_response(),
    };

    match s.service.is_enrolled_student(meeting.activity_id, identity.user_id) {
        Ok(true) => {}
        Ok(false) => {
            warn!(
                "User {} is not a student of activity {}",
                identity.user_id, meeting.activity_id
            );
            return ApiErrorType::from((
                StatusCode::FORBIDDEN,
                "Not enrolled as a student in this activity",
                None,
            ))
            .into_response();
        }
        Err(e) => return ApiErrorType::from(e).into_response(),
    }

    match s.service.scan(meeting_id, presented, identity.user_id) {
        Ok(outcome) => {
            let status = match outcome {
                ScanOutcome::Marked(_) => StatusCode::CREATED,
                _ => StatusCode::OK,
            };
            (
                status,
                Json(json!({
                    "meeting_id": meeting_id,
                    "result": outcome,
                    "message": outcome.message(),
                })),
            )
                .into_response()
        }
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}
