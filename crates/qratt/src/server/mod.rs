use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::{middleware as mw, Router};

use crate::server::endpoints::{activities, meetings, reports, scan, status};
use crate::server::middleware::identity;
use crate::types::AppState;

mod endpoints;
pub mod middleware;
mod types;
mod util;

pub use types::{ApiError, ApiErrorType};

/// Creates a router that can be used by `axum`.
///
/// # Parameters
/// - `app_state`: The app server state.
///
/// # Returns
/// The router.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Management, manual entry and reports
    let instructor_router = Router::new()
        .route("/activities", post(activities::post_activity))
        .route(
            "/activities/:activity_id",
            put(activities::put_activity).delete(activities::delete_activity),
        )
        .route(
            "/activities/:activity_id/enrolments",
            post(activities::post_enrolment),
        )
        .route(
            "/activities/:activity_id/meetings",
            get(meetings::get_meetings).post(meetings::post_meeting),
        )
        .route(
            "/activities/:activity_id/meetings/:meeting_id",
            put(meetings::put_meeting).delete(meetings::delete_meeting),
        )
        .route(
            "/activities/:activity_id/meetings/:meeting_id/activate",
            post(meetings::post_activate),
        )
        .route(
            "/activities/:activity_id/meetings/:meeting_id/end",
            post(meetings::post_end),
        )
        .route(
            "/activities/:activity_id/meetings/:meeting_id/qrcode",
            get(meetings::get_qrcode),
        )
        .route(
            "/activities/:activity_id/meetings/:meeting_id/attendance",
            get(meetings::get_attendance_sheet).post(meetings::post_attendance),
        )
        .route(
            "/activities/:activity_id/reports/overview",
            get(reports::get_overview),
        )
        .route(
            "/activities/:activity_id/reports/by_meeting",
            get(reports::get_by_meeting),
        )
        .route(
            "/activities/:activity_id/reports/by_student",
            get(reports::get_by_student),
        )
        .route("/activities/:activity_id/reports/csv", get(reports::get_csv))
        .layer(mw::from_fn(identity::require_instructor));

    // Any authenticated user
    let user_router = Router::new()
        .route("/statuses", get(status::get_statuses))
        .route("/scan", get(scan::get_scan))
        .route("/scan/url", post(scan::post_scan_url))
        .route(
            "/activities/:activity_id/meetings/active",
            get(meetings::get_active_meetings),
        )
        .route("/activities/:activity_id/summary", get(reports::get_summary))
        .merge(instructor_router)
        .layer(mw::from_fn(identity::require_identity));

    Router::new()
        .route("/health", get(status::get_health))
        .merge(user_router)
        .with_state(app_state)
}
