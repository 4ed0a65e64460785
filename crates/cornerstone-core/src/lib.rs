//! Client library for the Cornerstone OnDemand REST and OData reporting APIs.
//!
//! The interesting part is authentication:
//! - `auth::signer` computes the HMAC-SHA512 request signatures
//! - `auth::SessionManager` keeps a valid session or access token around,
//!   backed by a pluggable `cache::CacheBackend`
//!
//! `api::ApiClient` is a thin layer on top that signs and sends requests.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;

pub use api::{ApiClient, ApiError, EnvelopeKind, Filter, ODataQuery, ReportingView, ResponseEnvelope};
pub use auth::{
    AuthError, CachedCredential, Credential, CredentialRequest, ScopedAccessToken, SessionCredential,
    SessionManager,
};
pub use cache::CacheBackend;
pub use config::{CacheConfig, ClientConfig, Identity};
