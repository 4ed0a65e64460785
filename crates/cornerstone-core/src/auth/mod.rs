//! Request signing and credential management.
//!
//! This module provides:
//! - `signer`: HMAC-SHA512 signatures over canonical request strings
//! - `SessionCredential` / `ScopedAccessToken`: the two credential kinds
//! - `SessionManager`: cache-or-refresh lifecycle for those credentials
//! - `headers`: the header sets callers attach to signed requests

pub mod credential;
pub mod error;
pub mod headers;
pub mod session;
pub mod signer;

pub use credential::{
    CachedCredential, Credential, CredentialRequest, ScopedAccessToken, SessionCredential,
    ACCESS_TOKEN_TTL_SECS, SESSION_CACHE_KEY,
};
pub use error::AuthError;
pub use session::{build_http_client, SessionManager, OAUTH_TOKEN_PATH, SESSION_PATH};
pub use signer::{canonical_date, compute_signature, sign_session_creation, sign_session_request};
