use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tower::util::ServiceExt; // not axum::ServiceExt

use qratt::attendance::{AttendanceService, QrTokenSigner};
use qratt::clock::ManualClock;
use qratt::config::AppConfig;
use qratt::db::AttendanceDb;
use qratt::server::create_router;
use qratt::types::AppState;

pub const INSTRUCTOR: (i64, &str) = (1, "instructor");

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub clock: Arc<ManualClock>,
}

pub fn make_test_app() -> TestApp {
    let config = AppConfig {
        database_path: ":memory:".to_string(),
        site_secret: Some("integration-secret".to_string()),
        ..AppConfig::default()
    };
    let clock = Arc::new(ManualClock::new(start()));
    let service = AttendanceService::new(
        AttendanceDb::open_in_memory().unwrap(),
        clock.clone(),
        QrTokenSigner::new(config.site_secret.as_deref()),
        &config.base_url,
    );
    let router = create_router(Arc::new(AppState { service, config }));

    TestApp { router, clock }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub text: String,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.text).unwrap()
    }
}

impl TestApp {
    pub async fn send(&self, method: &str, uri: &str, user: Option<(i64, &str)>, body: Option<Value>) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = user {
            builder = builder
                .header("x-user-id", id.to_string())
                .header("x-user-role", role);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        Reply {
            status,
            headers,
            text: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }

    pub async fn instructor(&self, method: &str, uri: &str, body: Option<Value>) -> Reply {
        self.send(method, uri, Some(INSTRUCTOR), body).await
    }

    pub async fn student(&self, user_id: i64, method: &str, uri: &str, body: Option<Value>) -> Reply {
        self.send(method, uri, Some((user_id, "student")), body).await
    }

    /// Creates an activity with `students` enrolled (ids 100, 101, ...) and returns its id.
    pub async fn seed_activity(&self, students: usize) -> i64 {
        let reply = self
            .instructor("POST", "/activities", Some(serde_json::json!({ "name": "Algorithms" })))
            .await;
        assert_eq!(reply.status, StatusCode::CREATED);
        let activity_id = reply.json()["activity_id"].as_i64().unwrap();

        for i in 0..students as i64 {
            let reply = self
                .instructor(
                    "POST",
                    &format!("/activities/{activity_id}/enrolments"),
                    Some(serde_json::json!({
                        "user_id": 100 + i,
                        "first_name": format!("Student{i}"),
                        "last_name": format!("Last{i:02}"),
                        "email": format!("s{i}@uni.test"),
                    })),
                )
                .await;
            assert_eq!(reply.status, StatusCode::CREATED);
        }
        activity_id
    }

    pub async fn add_meeting(&self, activity_id: i64, number: i64) -> i64 {
        let reply = self
            .instructor(
                "POST",
                &format!("/activities/{activity_id}/meetings"),
                Some(serde_json::json!({
                    "meeting_number": number,
                    "topic": format!("Week {number}"),
                    "meeting_date": "2024-09-02T08:00:00Z",
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.text);
        reply.json()["meeting_id"].as_i64().unwrap()
    }

    /// Reads the QR display and returns the scan path (`/scan?token=..&meeting=..`).
    pub async fn scan_path(&self, activity_id: i64, meeting_id: i64) -> String {
        let reply = self
            .instructor(
                "GET",
                &format!("/activities/{activity_id}/meetings/{meeting_id}/qrcode"),
                None,
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.text);
        let payload = reply.json()["payload_url"].as_str().unwrap().to_string();
        let url = url::Url::parse(&payload).unwrap();
        format!("{}?{}", url.path(), url.query().unwrap())
    }
}
