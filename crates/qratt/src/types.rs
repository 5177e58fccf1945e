use crate::attendance::AttendanceService;
use crate::config::AppConfig;

/// State shared by every request handler.
pub struct AppState {
    /// Meetings, scans and manual entry over the store
    pub service: AttendanceService,
    pub config: AppConfig,
}
