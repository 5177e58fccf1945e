//! Time-bound QR tokens binding a meeting to an expiry instant.
//!
//! A token is the hex SHA-256 digest of `meeting_id ++ expiry_secs ++ secret`.
//! Nothing is stored server side: a scan recomputes the digest for the
//! meeting's current expiry and the two preceding 60 second slots. Digests
//! minted by an MD5 variant of this scheme do not validate here.

use super::error::AttendanceError;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use url::Url;

/// Secret used when the installation does not provide one.
pub const DEFAULT_SECRET: &str = "qratt_default_salt";

/// How long a displayed QR code stays valid before it is rotated.
pub const QR_LIFETIME_SECS: i64 = 60;

/// Number of refresh slots accepted during validation (current + 2 previous).
pub const TOKEN_WINDOW_SLOTS: i64 = 3;

/// Generates and validates QR tokens with an injected installation secret.
#[derive(Clone)]
pub struct QrTokenSigner {
    secret: String,
}

impl QrTokenSigner {
    /// Creates a signer. Absent or blank secrets fall back to [`DEFAULT_SECRET`].
    pub fn new(secret: Option<&str>) -> Self {
        let secret = match secret.map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => DEFAULT_SECRET.to_string(),
        };
        Self { secret }
    }

    /// Returns true if the signer is running on the fallback secret.
    pub fn uses_default_secret(&self) -> bool {
        self.secret == DEFAULT_SECRET
    }

    /// Derives the token for `meeting_id` expiring at `expiry`.
    pub fn generate(&self, meeting_id: i64, expiry: DateTime<Utc>) -> String {
        self.digest(meeting_id, expiry.timestamp())
    }

    /// Checks `presented` against the current expiry and the previous refresh slots.
    pub fn validate(&self, meeting_id: i64, presented: &str, current_expiry: DateTime<Utc>) -> bool {
        let expiry = current_expiry.timestamp();
        (0..TOKEN_WINDOW_SLOTS).any(|k| {
            let candidate = self.digest(meeting_id, expiry - k * QR_LIFETIME_SECS);
            constant_time_eq(&candidate, presented)
        })
    }

    fn digest(&self, meeting_id: i64, expiry_secs: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(meeting_id.to_string().as_bytes());
        hasher.update(expiry_secs.to_string().as_bytes());
        hasher.update(self.secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Debug for QrTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrTokenSigner")
            .field("default_secret", &self.uses_default_secret())
            .finish()
    }
}

/// Expiry of a code issued at `now`.
pub fn next_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::seconds(QR_LIFETIME_SECS)
}

/// Builds the payload encoded in the QR image: `{base}/scan?token=..&meeting=..`.
pub fn payload_url(base_url: &str, token: &str, meeting_id: i64) -> String {
    format!(
        "{}/scan?token={}&meeting={}",
        base_url.trim_end_matches('/'),
        token,
        meeting_id
    )
}

/// Extracts `(token, meeting_id)` from a pasted payload URL.
pub fn parse_payload_url(raw: &str) -> Result<(String, i64), AttendanceError> {
    let url = Url::parse(raw.trim())?;

    let mut token = None;
    let mut meeting = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "token" => token = Some(value.into_owned()),
            "meeting" => meeting = Some(value.into_owned()),
            _ => {}
        }
    }

    let token = token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AttendanceError::InvalidQrUrl {
            message: "missing token parameter".to_string(),
        })?;
    let meeting_id = meeting
        .ok_or_else(|| AttendanceError::InvalidQrUrl {
            message: "missing meeting parameter".to_string(),
        })?
        .parse::<i64>()
        .map_err(|e| AttendanceError::InvalidQrUrl {
            message: format!("bad meeting id: {e}"),
        })?;

    Ok((token, meeting_id))
}

/// URL of the rendered QR image for `payload`, served by an external generator.
pub fn qr_image_url(service: &str, payload: &str) -> Result<String, AttendanceError> {
    let mut url = Url::parse(service)?;
    url.query_pairs_mut().append_pair("data", payload);
    Ok(url.to_string())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
