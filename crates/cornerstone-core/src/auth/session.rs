//! Credential lifecycle: cache lookup, refresh and persistence.
//!
//! For every cache key the manager moves through
//! `Empty | Cached-Expired -> Refreshing -> Cached-Valid`. A valid cached
//! credential is returned without touching the network. Otherwise exactly one
//! authentication call is made; on success the credential is written to the
//! cache and returned, on failure the error is returned and the cache is left
//! as it was.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::credential::{
    parse_vendor_timestamp, CachedCredential, Credential, CredentialRequest, ScopedAccessToken,
    SessionCredential, SESSION_CACHE_KEY,
};
use super::headers::session_creation_headers;
use super::signer::{canonical_date, sign_session_creation};
use super::AuthError;
use crate::api::error::truncate_body;
use crate::cache::{build_backend, CacheBackend};
use crate::config::{ClientConfig, Identity};

/// Session creation endpoint. Also the exact path that gets signed.
pub const SESSION_PATH: &str = "/services/api/sts/session";

/// OAuth client-credentials token endpoint.
pub const OAUTH_TOKEN_PATH: &str = "/services/api/oauth2/token";

/// Status the session endpoint reports in its body on success.
const SESSION_CREATED_STATUS: u16 = 201;

#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    data: Vec<SessionRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SessionRecord {
    token: String,
    secret: String,
    alias: String,
    expires_on: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
    scope: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

type FlightLocks = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Build the HTTP client used for authentication and resource calls.
pub fn build_http_client(config: &ClientConfig) -> Result<Client, AuthError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Hands out valid credentials for one API identity.
///
/// Clone is cheap and clones share the cache and the HTTP connection pool.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    http: Client,
    identity: Identity,
    base_url: String,
    cache: Arc<dyn CacheBackend>,
    /// Present when concurrent refreshes of one key should be coalesced.
    in_flight: Option<FlightLocks>,
}

impl SessionManager {
    /// Create a manager with the cache backend named in `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, AuthError> {
        let http = build_http_client(config)?;
        let cache = build_backend(&config.cache, config.resolved_cache_dir(), &config.identity.namespace());
        Self::with_parts(config, http, cache)
    }

    /// Create a manager around an existing HTTP client and cache backend.
    pub fn with_parts(
        config: &ClientConfig,
        http: Client,
        cache: Arc<dyn CacheBackend>,
    ) -> Result<Self, AuthError> {
        config.validate()?;
        info!(
            corpname = %config.identity.corpname,
            backend = cache.name(),
            single_flight = config.single_flight,
            "Session manager ready"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                identity: config.identity.clone(),
                base_url: config.resolved_base_url(),
                cache,
                in_flight: config.single_flight.then(|| Mutex::new(HashMap::new())),
            }),
        })
    }

    /// Name of the active cache backend.
    pub fn backend_name(&self) -> &'static str {
        self.inner.cache.name()
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub async fn get_credential(&self, request: CredentialRequest) -> Result<Credential, AuthError> {
        match request {
            CredentialRequest::Session => self.session().await.map(Credential::Session),
            CredentialRequest::Scoped(scope) => self.access_token(&scope).await.map(Credential::Scoped),
        }
    }

    /// A session valid now, from the cache or freshly created.
    pub async fn session(&self) -> Result<SessionCredential, AuthError> {
        self.inner.identity.session_fields()?;
        let inner = Arc::clone(&self.inner);
        self.get_or_refresh(SESSION_CACHE_KEY, async move { inner.create_session().await })
            .await
    }

    /// An access token for `scope` valid now, from the cache or freshly requested.
    pub async fn access_token(&self, scope: &str) -> Result<ScopedAccessToken, AuthError> {
        if scope.trim().is_empty() {
            return Err(AuthError::Configuration("access token scope must not be empty".to_string()));
        }
        if scope == SESSION_CACHE_KEY {
            return Err(AuthError::Configuration(format!(
                "access token scope {:?} is reserved for the session cache entry",
                scope
            )));
        }
        let inner = Arc::clone(&self.inner);
        let requested = scope.to_string();
        self.get_or_refresh(scope, async move { inner.request_access_token(&requested).await })
            .await
    }

    /// Return the cached credential under `key` if still valid, else run `refresh`.
    ///
    /// `refresh` and the cache write run on their own task: a caller that
    /// gives up waiting does not cut the write short.
    async fn get_or_refresh<C, F>(&self, key: &str, refresh: F) -> Result<C, AuthError>
    where
        C: CachedCredential + Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Future<Output = Result<C, AuthError>> + Send + 'static,
    {
        let _guard = match self.inner.flight_lock(key) {
            Some(lock) => Some(lock.lock_owned().await),
            None => None,
        };

        let now = Utc::now();
        match self.inner.read_cached::<C>(key).await {
            Some(cached) if cached.is_valid(now) => {
                debug!(
                    key = key,
                    expires_in_secs = cached.time_until_expiry(now).num_seconds(),
                    "Using cached credential"
                );
                return Ok(cached);
            }
            Some(_) => debug!(key = key, "Cached credential expired, refreshing"),
            None => debug!(key = key, "No cached credential, authenticating"),
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let fresh = refresh.await?;
            inner.persist(&fresh).await;
            Ok::<C, AuthError>(fresh)
        });
        task.await
            .map_err(|e| AuthError::AuthenticationFailed(format!("credential refresh task failed: {}", e)))?
    }
}

impl Inner {
    fn flight_lock(&self, key: &str) -> Option<Arc<AsyncMutex<()>>> {
        let locks = self.in_flight.as_ref()?;
        let mut locks = locks.lock().unwrap_or_else(PoisonError::into_inner);
        Some(Arc::clone(locks.entry(key.to_string()).or_default()))
    }

    /// Cached credential under `key`. Unreadable caches and entries count as a miss.
    async fn read_cached<C: DeserializeOwned>(&self, key: &str) -> Option<C> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(credential) => Some(credential),
                Err(e) => {
                    warn!(key = key, error = %e, "Discarding unreadable cached credential");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                let err = AuthError::CacheUnavailable(format!("{:#}", e));
                warn!(key = key, backend = self.cache.name(), error = %err, "Treating cache read failure as a miss");
                None
            }
        }
    }

    /// Best effort: a failed write only costs a re-authentication later.
    async fn persist<C: CachedCredential + Serialize>(&self, credential: &C) {
        let key = credential.cache_key();
        let serialized = match serde_json::to_string(credential) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to serialize credential for cache");
                return;
            }
        };
        match self.cache.put(key, &serialized).await {
            Ok(()) => debug!(key = key, backend = self.cache.name(), "Credential cached"),
            Err(e) => {
                let err = AuthError::CacheUnavailable(format!("{:#}", e));
                warn!(key = key, backend = self.cache.name(), error = %err, "Failed to cache credential");
            }
        }
    }

    async fn create_session(&self) -> Result<SessionCredential, AuthError> {
        let (username, alias) = self.identity.session_fields()?;
        let now = Utc::now();
        let date = canonical_date(now);
        let signature = sign_session_creation(&self.identity.api_id, &self.identity.api_secret, &date, SESSION_PATH)?;
        let headers = session_creation_headers(&self.identity.api_id, &date, &signature)?;
        let alias = format!("{}{}", alias, now.timestamp_millis());
        let url = format!("{}{}", self.base_url, SESSION_PATH);

        info!(corpname = %self.identity.corpname, "Requesting new API session");
        let response = self
            .http
            .post(&url)
            .headers(headers)
            .query(&[("userName", username), ("alias", alias.as_str())])
            .send()
            .await?;
        let body = success_body(response, "session").await?;

        let envelope: SessionResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::AuthenticationFailed(format!("unreadable session response: {}", e))
        })?;
        if let Some(status) = envelope.status {
            if status != SESSION_CREATED_STATUS {
                return Err(AuthError::AuthenticationFailed(format!(
                    "session endpoint reported status {}",
                    status
                )));
            }
        }
        let record = envelope.data.into_iter().next().ok_or_else(|| {
            AuthError::AuthenticationFailed("session response carried no session".to_string())
        })?;

        let session = SessionCredential {
            token: record.token,
            secret: record.secret,
            alias: record.alias,
            expires_on: parse_vendor_timestamp(&record.expires_on)?,
        };
        info!(alias = %session.alias, expires_on = %session.expires_on, "API session created");
        Ok(session)
    }

    async fn request_access_token(&self, scope: &str) -> Result<ScopedAccessToken, AuthError> {
        let url = format!("{}{}", self.base_url, OAUTH_TOKEN_PATH);
        let request = TokenRequest {
            client_id: &self.identity.api_id,
            client_secret: &self.identity.api_secret,
            grant_type: "client_credentials",
            scope,
        };

        info!(scope = scope, "Requesting new access token");
        let response = self
            .http
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&request)
            .send()
            .await?;
        let body = success_body(response, "token").await?;

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::AuthenticationFailed(format!("unreadable token response: {}", e))
        })?;
        Ok(ScopedAccessToken {
            access_token: token.access_token,
            scope: scope.to_string(),
            created_at: Utc::now(),
        })
    }
}

/// Body of a 2xx response, or `AuthenticationFailed` carrying the status.
async fn success_body(response: reqwest::Response, endpoint: &str) -> Result<String, AuthError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        warn!(endpoint = endpoint, status = status.as_u16(), "Authentication rejected");
        Err(AuthError::AuthenticationFailed(format!(
            "{} endpoint returned {}: {}",
            endpoint,
            status,
            truncate_body(&body)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FileCache;

    fn manager(single_flight: bool) -> SessionManager {
        let mut config = ClientConfig::new(Identity::new("id", "c2VjcmV0", "acme"));
        config.single_flight = single_flight;
        let cache: Arc<dyn CacheBackend> = Arc::new(FileCache::new(std::env::temp_dir()));
        SessionManager::with_parts(&config, Client::new(), cache).unwrap()
    }

    #[test]
    fn test_flight_locks_only_with_single_flight() {
        assert!(manager(false).inner.flight_lock("session").is_none());

        let coalescing = manager(true);
        let first = coalescing.inner.flight_lock("session").unwrap();
        let second = coalescing.inner.flight_lock("session").unwrap();
        let other = coalescing.inner.flight_lock("employee:read").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn test_base_url_is_resolved() {
        assert_eq!(manager(false).base_url(), "https://acme.csod.com");
    }

    #[test]
    fn test_missing_identity_rejected_at_construction() {
        let config = ClientConfig::new(Identity::new("", "c2VjcmV0", "acme"));
        let cache: Arc<dyn CacheBackend> = Arc::new(FileCache::new(std::env::temp_dir()));
        let result = SessionManager::with_parts(&config, Client::new(), cache);
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_session_requires_username_and_alias() {
        let err = manager(false).session().await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_empty_scope_rejected() {
        let err = manager(false).access_token("  ").await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_session_key_is_not_a_scope() {
        let err = manager(false).access_token(SESSION_CACHE_KEY).await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration(ref msg) if msg.contains("reserved")));

        let err = manager(false)
            .get_credential(CredentialRequest::Scoped("session".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }
}
