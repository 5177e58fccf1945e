use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::db::Student;
use crate::server::types::ApiErrorType;
use crate::server::util::json_or_error;
use crate::types::AppState;

#[derive(Debug, Deserialize)]
pub struct ActivityForm {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct EnrolmentForm {
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "student".to_string()
}

/// POST /activities
pub async fn post_activity(State(s): State<Arc<AppState>>, Json(form): Json<ActivityForm>) -> Response {
    info!("POST /activities");
    json_or_error(StatusCode::CREATED, s.service.create_activity(&form.name))
}

/// PUT /activities/:activity_id
pub async fn put_activity(
    Path(activity_id): Path<i64>,
    State(s): State<Arc<AppState>>,
    Json(form): Json<ActivityForm>,
) -> Response {
    info!("PUT /activities/{}", activity_id);
    json_or_error(StatusCode::OK, s.service.rename_activity(activity_id, &form.name))
}

/// DELETE /activities/:activity_id
pub async fn delete_activity(Path(activity_id): Path<i64>, State(s): State<Arc<AppState>>) -> Response {
    info!("DELETE /activities/{}", activity_id);

    match s.service.delete_activity(activity_id) {
        Ok(meetings) => (
            StatusCode::OK,
            Json(json!({ "activity_id": activity_id, "meetings_deleted": meetings })),
        )
            .into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}

/// POST /activities/:activity_id/enrolments
/// Mirrors a host enrolment into the roster
pub async fn post_enrolment(
    Path(activity_id): Path<i64>,
    State(s): State<Arc<AppState>>,
    Json(form): Json<EnrolmentForm>,
) -> Response {
    info!("POST /activities/{}/enrolments", activity_id);

    let student = Student {
        user_id: form.user_id,
        first_name: form.first_name,
        last_name: form.last_name,
        email: form.email,
    };
    match s.service.enrol(activity_id, &student, form.role.trim()) {
        Ok(()) => (StatusCode::CREATED, Json(student)).into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}
