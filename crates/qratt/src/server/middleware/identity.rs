//! Host-supplied identity and capability checks.
//!
//! The host environment authenticates the user and forwards the result in
//! the `x-user-id` and `x-user-role` headers.

use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::server::types::ApiErrorType;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Instructor,
}

impl Role {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Role::Student),
            "instructor" => Some(Role::Instructor),
            _ => None,
        }
    }
}

/// The authenticated caller, stored in request extensions by [`require_identity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
}

impl Identity {
    fn from_headers(headers: &HeaderMap) -> Result<Self, &'static str> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .ok_or("Missing or invalid x-user-id header")?;
        let role = headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(Role::parse)
            .ok_or("Missing or invalid x-user-role header")?;

        Ok(Self { user_id, role })
    }
}

/// Rejects requests without a valid identity with 401.
pub async fn require_identity(mut req: Request, next: Next) -> Response {
    match Identity::from_headers(req.headers()) {
        Ok(identity) => {
            debug!("Request from user {} ({:?})", identity.user_id, identity.role);
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(message) => ApiErrorType::from((StatusCode::UNAUTHORIZED, message, None)).into_response(),
    }
}

/// Restricts management and report routes to instructors (403 otherwise).
///
/// Must run after [`require_identity`].
pub async fn require_instructor(req: Request, next: Next) -> Response {
    match req.extensions().get::<Identity>().copied() {
        Some(Identity {
            role: Role::Instructor,
            ..
        }) => next.run(req).await,
        Some(identity) => {
            warn!(
                "User {} denied access to {} {}",
                identity.user_id,
                req.method(),
                req.uri().path()
            );
            ApiErrorType::from((StatusCode::FORBIDDEN, "Instructor capability required", None)).into_response()
        }
        None => ApiErrorType::from((StatusCode::UNAUTHORIZED, "No identity on request", None)).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(id: Option<&str>, role: Option<&str>) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Some(id) = id {
            h.insert(USER_ID_HEADER, HeaderValue::from_str(id).unwrap());
        }
        if let Some(role) = role {
            h.insert(USER_ROLE_HEADER, HeaderValue::from_str(role).unwrap());
        }
        h
    }

    #[test]
    fn parses_valid_identity() {
        let identity = Identity::from_headers(&headers(Some("42"), Some("Instructor"))).unwrap();
        assert_eq!(
            identity,
            Identity {
                user_id: 42,
                role: Role::Instructor
            }
        );
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(Identity::from_headers(&headers(None, Some("student"))).is_err());
        assert!(Identity::from_headers(&headers(Some("abc"), Some("student"))).is_err());
        assert!(Identity::from_headers(&headers(Some("0"), Some("student"))).is_err());
        assert!(Identity::from_headers(&headers(Some("5"), Some("admin"))).is_err());
        assert!(Identity::from_headers(&headers(Some("5"), None)).is_err());
    }
}
