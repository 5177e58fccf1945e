use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::server::util::json_or_error;
use crate::types::AppState;

/// GET /health
pub async fn get_health(State(s): State<Arc<AppState>>) -> Response {
    info!("GET /health");

    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "default_secret": s.service.signer().uses_default_secret(),
        })),
    )
        .into_response()
}

/// GET /statuses
/// Returns the attendance status catalogue with grade weights
pub async fn get_statuses(State(s): State<Arc<AppState>>) -> Response {
    info!("GET /statuses");
    json_or_error(StatusCode::OK, s.service.db().list_statuses())
}
