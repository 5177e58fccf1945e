use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::attendance::AttendanceError;

/// JSON body returned for every failed request.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// An error response: status code plus [`ApiError`] body.
#[derive(Debug)]
pub struct ApiErrorType {
    status: StatusCode,
    body: ApiError,
}

impl ApiErrorType {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<T: Into<String>> From<(StatusCode, T, Option<String>)> for ApiErrorType {
    fn from((status, error, context): (StatusCode, T, Option<String>)) -> Self {
        Self {
            status,
            body: ApiError {
                error: error.into(),
                context,
            },
        }
    }
}

impl From<AttendanceError> for ApiErrorType {
    fn from(err: AttendanceError) -> Self {
        let (status, message) = if err.is_not_found() {
            (StatusCode::NOT_FOUND, "Not found")
        } else if err.is_validation() {
            (StatusCode::UNPROCESSABLE_ENTITY, "Validation failed")
        } else {
            error!("Request failed: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        };

        ApiErrorType::from((status, message, Some(err.to_string())))
    }
}

impl IntoResponse for ApiErrorType {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
