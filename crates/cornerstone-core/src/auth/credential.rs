use std::fmt;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Cache key under which the session credential is stored.
pub const SESSION_CACHE_KEY: &str = "session";

/// Lifetime assumed for OAuth access tokens, counted from when we received them.
/// The token response's own expiry is not consulted.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 3600;

/// Capability shared by every credential the session manager caches.
pub trait CachedCredential {
    /// Instant from which the credential must no longer be used.
    fn expires_at(&self) -> DateTime<Utc>;

    /// Key the credential is stored under.
    fn cache_key(&self) -> &str;

    fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }

    fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at() - now
    }
}

/// Token and per-call signing secret returned by the session endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredential {
    pub token: String,
    /// Base64-encoded HMAC key for signing requests made with this session.
    pub secret: String,
    pub alias: String,
    pub expires_on: DateTime<Utc>,
}

impl CachedCredential for SessionCredential {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_on
    }

    fn cache_key(&self) -> &str {
        SESSION_CACHE_KEY
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("token", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("alias", &self.alias)
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Bearer token obtained through the client-credentials grant for one scope.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedAccessToken {
    pub access_token: String,
    pub scope: String,
    pub created_at: DateTime<Utc>,
}

impl CachedCredential for ScopedAccessToken {
    fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(ACCESS_TOKEN_TTL_SECS)
    }

    fn cache_key(&self) -> &str {
        &self.scope
    }
}

impl fmt::Debug for ScopedAccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedAccessToken")
            .field("access_token", &"<redacted>")
            .field("scope", &self.scope)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Which credential a caller needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialRequest {
    Session,
    Scoped(String),
}

impl CredentialRequest {
    pub fn cache_key(&self) -> &str {
        match self {
            CredentialRequest::Session => SESSION_CACHE_KEY,
            CredentialRequest::Scoped(scope) => scope,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Session(SessionCredential),
    Scoped(ScopedAccessToken),
}

impl Credential {
    pub fn as_session(&self) -> Option<&SessionCredential> {
        match self {
            Credential::Session(session) => Some(session),
            Credential::Scoped(_) => None,
        }
    }

    pub fn as_scoped(&self) -> Option<&ScopedAccessToken> {
        match self {
            Credential::Scoped(token) => Some(token),
            Credential::Session(_) => None,
        }
    }
}

impl CachedCredential for Credential {
    fn expires_at(&self) -> DateTime<Utc> {
        match self {
            Credential::Session(session) => session.expires_at(),
            Credential::Scoped(token) => token.expires_at(),
        }
    }

    fn cache_key(&self) -> &str {
        match self {
            Credential::Session(session) => session.cache_key(),
            Credential::Scoped(token) => token.cache_key(),
        }
    }
}

/// Parse an `ExpiresOn` value from the session endpoint.
///
/// The vendor sends either RFC 3339 or a bare `2019-03-12T14:54:27.000`,
/// which is UTC.
pub fn parse_vendor_timestamp(raw: &str) -> Result<DateTime<Utc>, AuthError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| AuthError::AuthenticationFailed(format!("unreadable session expiry {:?}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session_expiring(expires_on: DateTime<Utc>) -> SessionCredential {
        SessionCredential {
            token: "token".to_string(),
            secret: "c2VjcmV0".to_string(),
            alias: "alias".to_string(),
            expires_on,
        }
    }

    #[test]
    fn test_session_validity_is_strict() {
        let now = Utc::now();
        assert!(session_expiring(now + Duration::minutes(5)).is_valid(now));
        assert!(!session_expiring(now).is_valid(now));
        assert!(!session_expiring(now - Duration::seconds(1)).is_valid(now));
    }

    #[test]
    fn test_scoped_token_uses_fixed_ttl() {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let token = ScopedAccessToken {
            access_token: "abc".to_string(),
            scope: "employee:read".to_string(),
            created_at,
        };
        assert_eq!(token.expires_at(), created_at + Duration::hours(1));
        assert!(token.is_valid(created_at + Duration::minutes(59)));
        assert!(!token.is_valid(created_at + Duration::minutes(60)));
        assert_eq!(token.cache_key(), "employee:read");
    }

    #[test]
    fn test_credential_delegates() {
        let now = Utc::now();
        let credential = Credential::Session(session_expiring(now + Duration::minutes(1)));
        assert_eq!(credential.cache_key(), SESSION_CACHE_KEY);
        assert!(credential.is_valid(now));
        assert!(credential.as_scoped().is_none());
    }

    #[test]
    fn test_round_trip_keeps_sub_second_precision() {
        let expires_on = Utc.timestamp_nanos(1_552_398_867_123_456_789);
        let original = session_expiring(expires_on);
        let json = serde_json::to_string(&original).unwrap();
        let restored: SessionCredential = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", session_expiring(Utc::now()));
        assert!(!rendered.contains("c2VjcmV0"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_parse_vendor_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2019, 3, 12, 14, 54, 27).unwrap();
        assert_eq!(parse_vendor_timestamp("2019-03-12T14:54:27.000").unwrap(), expected);
        assert_eq!(parse_vendor_timestamp("2019-03-12T14:54:27").unwrap(), expected);
        assert_eq!(parse_vendor_timestamp("2019-03-12T15:54:27+01:00").unwrap(), expected);
        assert!(parse_vendor_timestamp("next tuesday").is_err());
    }
}
