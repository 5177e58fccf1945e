use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::attendance::AttendanceError;
use crate::server::types::ApiErrorType;

/// Serializes `result` with `status` on success, or maps the error to its API response.
pub fn json_or_error<T: Serialize>(status: StatusCode, result: Result<T, AttendanceError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}
