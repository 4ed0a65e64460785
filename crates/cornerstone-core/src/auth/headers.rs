//! Header sets attached to outbound requests.

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};

use super::signer::{HEADER_API_KEY, HEADER_DATE, HEADER_SESSION_TOKEN, HEADER_SIGNATURE};
use super::{AuthError, ScopedAccessToken, SessionCredential};

fn value(raw: &str, field: &str) -> Result<HeaderValue, AuthError> {
    HeaderValue::from_str(raw).map_err(|_| {
        AuthError::InvalidCredentialInput(format!("{} contains characters not allowed in a header", field))
    })
}

/// Headers for the session creation call.
pub fn session_creation_headers(api_key: &str, date: &str, signature: &str) -> Result<HeaderMap, AuthError> {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static(HEADER_API_KEY), value(api_key, "api key")?);
    headers.insert(HeaderName::from_static(HEADER_DATE), value(date, "date")?);
    headers.insert(HeaderName::from_static(HEADER_SIGNATURE), value(signature, "signature")?);
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    Ok(headers)
}

/// Headers for a resource call signed with a session.
///
/// `max_page_size` adds the OData `Prefer: odata.maxpagesize=<n>` header.
pub fn session_headers(
    session: &SessionCredential,
    date: &str,
    signature: &str,
    max_page_size: Option<u32>,
) -> Result<HeaderMap, AuthError> {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static(HEADER_DATE), value(date, "date")?);
    headers.insert(
        HeaderName::from_static(HEADER_SESSION_TOKEN),
        value(&session.token, "session token")?,
    );
    headers.insert(HeaderName::from_static(HEADER_SIGNATURE), value(signature, "signature")?);
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(size) = max_page_size {
        headers.insert(
            HeaderName::from_static("prefer"),
            value(&format!("odata.maxpagesize={}", size), "page size")?,
        );
    }
    Ok(headers)
}

/// Headers for a call authorized by an OAuth access token.
pub fn bearer_headers(token: &ScopedAccessToken) -> Result<HeaderMap, AuthError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        value(&format!("Bearer {}", token.access_token), "access token")?,
    );
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}
