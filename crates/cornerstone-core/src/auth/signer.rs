//! HMAC-SHA512 request signing.
//!
//! Every signature is computed over a canonical string: an ordered list of
//! lines joined with `\n`. The vendor rebuilds the same string server-side,
//! so any formatting drift (including in the date) invalidates the request.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::Sha512;
use tracing::debug;

use super::AuthError;

type HmacSha512 = Hmac<Sha512>;

/// ISO-8601 with milliseconds and no timezone marker, e.g. `2019-03-11T17:05:00.969`.
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

pub const HEADER_API_KEY: &str = "x-csod-api-key";
pub const HEADER_DATE: &str = "x-csod-date";
pub const HEADER_SESSION_TOKEN: &str = "x-csod-session-token";
pub const HEADER_SIGNATURE: &str = "x-csod-signature";

/// Format a timestamp the way it appears in `x-csod-date` and in the signed content.
pub fn canonical_date(at: DateTime<Utc>) -> String {
    at.format(DATE_FORMAT).to_string()
}

/// Sign the newline-joined `lines` with a base64-encoded secret.
///
/// Returns the base64-encoded HMAC-SHA512 digest.
pub fn compute_signature<S: AsRef<str>>(secret_b64: &str, lines: &[S]) -> Result<String, AuthError> {
    let key = STANDARD.decode(secret_b64).map_err(|e| {
        AuthError::InvalidCredentialInput(format!("signing secret is not valid base64: {}", e))
    })?;

    let canonical = lines
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join("\n");

    let mut mac = HmacSha512::new_from_slice(&key)
        .map_err(|e| AuthError::InvalidCredentialInput(e.to_string()))?;
    mac.update(canonical.as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Canonical lines for the initial `POST` that creates a session.
pub fn session_creation_lines(api_key: &str, date: &str, path: &str) -> [String; 4] {
    [
        "POST".to_string(),
        format!("{}:{}", HEADER_API_KEY, api_key),
        format!("{}:{}", HEADER_DATE, date),
        path.to_string(),
    ]
}

/// Canonical lines for a request made with an established session.
pub fn session_request_lines(method: &str, date: &str, session_token: &str, path: &str) -> [String; 4] {
    [
        method.to_string(),
        format!("{}:{}", HEADER_DATE, date),
        format!("{}:{}", HEADER_SESSION_TOKEN, session_token),
        path.to_string(),
    ]
}

/// Signature for the session creation call, keyed by the API secret.
pub fn sign_session_creation(
    api_key: &str,
    api_secret: &str,
    date: &str,
    path: &str,
) -> Result<String, AuthError> {
    debug!(path = path, date = date, "Signing session creation request");
    compute_signature(api_secret, &session_creation_lines(api_key, date, path))
}

/// Signature for a resource call, keyed by the session secret.
pub fn sign_session_request(
    method: &str,
    date: &str,
    session_token: &str,
    session_secret: &str,
    path: &str,
) -> Result<String, AuthError> {
    debug!(method = method, path = path, date = date, "Signing session request");
    compute_signature(
        session_secret,
        &session_request_lines(method, date, session_token, path),
    )
}

/// The part of a request target that gets signed: the path, without query string.
///
/// Accepts either an absolute URL (as found in `@odata.nextLink`) or a bare path.
pub fn signing_path(target: &str) -> String {
    if let Ok(url) = Url::parse(target) {
        return url.path().to_string();
    }
    match target.split_once('?') {
        Some((path, _)) => path.to_string(),
        None => target.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "Y29ybmVyc3RvbmUtdGVzdC1zZWNyZXQtMDEyMzQ1Njc4OQ==";

    #[test]
    fn test_canonical_date_strips_timezone_marker() {
        let at = Utc.timestamp_millis_opt(1_552_398_867_000).unwrap();
        assert_eq!(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true), "2019-03-12T13:54:27.000Z");
        assert_eq!(canonical_date(at), "2019-03-12T13:54:27.000");
    }

    #[test]
    fn test_canonical_date_keeps_milliseconds() {
        let at = Utc.timestamp_millis_opt(1_552_323_900_969).unwrap();
        assert_eq!(canonical_date(at), "2019-03-11T17:05:00.969");
    }

    #[test]
    fn test_session_creation_known_vector() {
        let signature = sign_session_creation(
            "1a2b3c4d5e",
            SECRET,
            "2019-03-12T13:54:27.000",
            "/services/api/sts/session",
        )
        .unwrap();
        assert_eq!(
            signature,
            "/yBSii7ammpqCJRU/nftrCyzbGjLXjd2aleHoukjyU5oYBjDaCLeOY+kL3MXVEYjiqkFPMAcynwLjs8RgJDs0A=="
        );
    }

    #[test]
    fn test_session_request_known_vector() {
        let signature = sign_session_request(
            "GET",
            "2019-03-12T13:54:27.000",
            "9f8e7d6c",
            SECRET,
            "/services/api/x/odata/api/views/vw_rpt_user",
        )
        .unwrap();
        assert_eq!(
            signature,
            "YLUzc7yeC5tTW5YtfZyyH63P0OLhiPIS/Aa53xpfluDZxGZvkMtUiQTytEWrPZnZF6W12jhZx/32y/f0TSP7Ow=="
        );
    }

    #[test]
    fn test_signature_is_deterministic() {
        let lines = session_request_lines("PATCH", "2020-01-01T00:00:00.000", "tok", "/any/path with spaces");
        let first = compute_signature(SECRET, &lines).unwrap();
        let second = compute_signature(SECRET, &lines).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_line_order_matters() {
        let creation = session_creation_lines("key", "2020-01-01T00:00:00.000", "/p");
        let mut swapped = creation.clone();
        swapped.swap(1, 2);
        assert_ne!(
            compute_signature(SECRET, &creation).unwrap(),
            compute_signature(SECRET, &swapped).unwrap()
        );
    }

    #[test]
    fn test_undecodable_secret_is_rejected() {
        let err = compute_signature("not base64!!", &["GET"]).unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentialInput(_)));
    }

    #[test]
    fn test_signing_path_drops_query() {
        assert_eq!(signing_path("/services/api/x/odata/api/views/vw_rpt_user?$filter=user_id eq 1"), "/services/api/x/odata/api/views/vw_rpt_user");
        assert_eq!(signing_path("/services/api/sts/session"), "/services/api/sts/session");
        assert_eq!(
            signing_path("https://acme.csod.com/services/api/x/odata/api/views/vw_rpt_ou?$skiptoken=42"),
            "/services/api/x/odata/api/views/vw_rpt_ou"
        );
    }
}
