//! API client for the tenant's REST services and OData reporting views.
//!
//! Every request is authenticated before it is sent: either signed with the
//! current session (`x-csod-*` headers) or carrying an OAuth bearer token.
//! If no credential can be obtained the request is not sent at all.

use chrono::Utc;
use reqwest::{Client, Method, Response, Url};
use serde_json::Value;
use tracing::{debug, warn};

use super::envelope::{EnvelopeKind, ResponseEnvelope};
use super::odata::ODataQuery;
use super::paths::ReportingView;
use super::ApiError;
use crate::auth::headers::{bearer_headers, session_headers};
use crate::auth::signer::{canonical_date, sign_session_request, signing_path};
use crate::auth::{build_http_client, SessionManager};
use crate::cache::build_backend;
use crate::config::ClientConfig;

/// Upper bound on pages followed by `reporting_all`.
/// Stops a server that keeps handing out next links from looping forever.
const MAX_REPORTING_PAGES: usize = 1000;

/// Client for one tenant and identity.
/// Clone is cheap - the HTTP client and session manager are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    sessions: SessionManager,
    max_page_size: u32,
}

impl ApiClient {
    /// Create a client, its session manager and the configured token cache
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = build_http_client(config)?;
        let cache = build_backend(&config.cache, config.resolved_cache_dir(), &config.identity.namespace());
        let sessions = SessionManager::with_parts(config, client.clone(), cache)?;
        Ok(Self::with_session_manager(config, client, sessions))
    }

    /// Create a client around an existing session manager, sharing its connection pool.
    pub fn with_session_manager(config: &ClientConfig, client: Client, sessions: SessionManager) -> Self {
        Self {
            client,
            sessions,
            max_page_size: config.max_page_size,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn base_url(&self) -> &str {
        self.sessions.base_url()
    }

    fn url(&self, path: &str, query: &[(String, String)]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url(), path))
            .map_err(|e| ApiError::InvalidUrl(format!("{}{}: {}", self.base_url(), path, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Resolve a next link, absolute or relative to the tenant.
    ///
    /// Links to any other origin are refused: following one would hand the
    /// session token and a valid signature to that host.
    fn resolve_link(&self, link: &str) -> Result<Url, ApiError> {
        let base = Url::parse(self.base_url())
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", self.base_url(), e)))?;
        let url = base
            .join(link)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", link, e)))?;
        if url.origin() != base.origin() {
            warn!(link = link, "Refusing next link to another host");
            return Err(ApiError::InvalidUrl(format!(
                "next link {} leaves {}",
                link,
                self.base_url()
            )));
        }
        Ok(url)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Request rejected");
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Response body as JSON; an empty body is `null`.
    async fn json_body(response: Response) -> Result<Value, ApiError> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("response is not JSON: {}", e)))
    }

    async fn send_signed(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Response, ApiError> {
        let session = self.sessions.session().await?;
        let date = canonical_date(Utc::now());
        let path = signing_path(url.as_str());
        let signature = sign_session_request(method.as_str(), &date, &session.token, &session.secret, &path)?;
        let headers = session_headers(&session, &date, &signature, Some(self.max_page_size))?;

        debug!(method = %method, path = %path, "Sending signed request");
        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        Self::check_response(response).await
    }

    /// Send a request signed with the current session.
    pub async fn signed_request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Response, ApiError> {
        let url = self.url(path, query)?;
        self.send_signed(method, url, body).await
    }

    /// Send a request authorized with an OAuth access token for `scope`.
    pub async fn bearer_request(
        &self,
        scope: &str,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Response, ApiError> {
        let token = self.sessions.access_token(scope).await?;
        let headers = bearer_headers(&token)?;
        let url = self.url(path, query)?;

        debug!(method = %method, path = path, scope = scope, "Sending bearer request");
        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        Self::check_response(response).await
    }

    // ===== Vendor REST =====

    /// Signed REST call returning the raw JSON body.
    pub async fn rest_raw(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let response = self.signed_request(method, path, query, body).await?;
        Self::json_body(response).await
    }

    /// Signed REST call unwrapped as the given envelope kind.
    pub async fn rest(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
        kind: EnvelopeKind,
    ) -> Result<ResponseEnvelope, ApiError> {
        let body = self.rest_raw(method, path, query, body).await?;
        ResponseEnvelope::parse(kind, body)
    }

    // ===== OData Reporting =====

    async fn reporting_page(&self, url: Url) -> Result<ResponseEnvelope, ApiError> {
        let response = self.send_signed(Method::GET, url, None).await?;
        let body = Self::json_body(response).await?;
        ResponseEnvelope::parse(EnvelopeKind::ODataList, body)
    }

    /// First page of a reporting view.
    pub async fn reporting(&self, view: &ReportingView, query: &ODataQuery) -> Result<Vec<Value>, ApiError> {
        let url = self.url(&view.path(), &query.to_pairs())?;
        self.reporting_page(url).await?.into_items()
    }

    /// Every page of a reporting view, following `@odata.nextLink`.
    pub async fn reporting_all(&self, view: &ReportingView, query: &ODataQuery) -> Result<Vec<Value>, ApiError> {
        let mut url = self.url(&view.path(), &query.to_pairs())?;
        let mut items = Vec::new();

        for page in 1..=MAX_REPORTING_PAGES {
            let envelope = self.reporting_page(url).await?;
            let next = envelope.next_link().map(str::to_string);
            items.extend(envelope.into_items()?);

            match next {
                Some(link) => {
                    debug!(view = view.slug(), page = page, fetched = items.len(), "Following OData next link");
                    url = self.resolve_link(&link)?;
                }
                None => return Ok(items),
            }
        }

        warn!(view = view.slug(), pages = MAX_REPORTING_PAGES, "Giving up on endless OData paging");
        Err(ApiError::InvalidResponse(format!(
            "{} returned more than {} pages",
            view.slug(),
            MAX_REPORTING_PAGES
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Identity;

    fn client() -> ApiClient {
        let mut config = ClientConfig::new(Identity::new("id", "c2VjcmV0", "acme"));
        config.cache_dir = Some(std::env::temp_dir().join("cornerstone-client-unit"));
        ApiClient::new(&config).unwrap()
    }

    #[test]
    fn test_url_encodes_query() {
        let url = client()
            .url(
                "/services/api/x/odata/api/views/vw_rpt_user",
                &[("$filter".to_string(), "user_ref eq 'A&B'".to_string())],
            )
            .unwrap();
        assert_eq!(url.path(), "/services/api/x/odata/api/views/vw_rpt_user");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("$filter".to_string(), "user_ref eq 'A&B'".to_string())]);
    }

    #[test]
    fn test_resolve_link_handles_absolute_and_relative() {
        let client = client();
        assert_eq!(
            client.resolve_link("https://acme.csod.com/services/api/x/odata/api/views/vw_rpt_ou?$skiptoken=5").unwrap().as_str(),
            "https://acme.csod.com/services/api/x/odata/api/views/vw_rpt_ou?$skiptoken=5"
        );
        assert_eq!(
            client.resolve_link("/services/api/x/odata/api/views/vw_rpt_ou?$skiptoken=5").unwrap().as_str(),
            "https://acme.csod.com/services/api/x/odata/api/views/vw_rpt_ou?$skiptoken=5"
        );
    }

    #[test]
    fn test_resolve_link_rejects_other_origins() {
        let client = client();
        for link in [
            "https://evil.example.com/services/api/x/odata/api/views/vw_rpt_ou?$skiptoken=5",
            "http://acme.csod.com/services/api/x/odata/api/views/vw_rpt_ou",
            "https://acme.csod.com:8443/services/api/x/odata/api/views/vw_rpt_ou",
            "//evil.example.com/services/api/x/odata/api/views/vw_rpt_ou",
        ] {
            assert!(matches!(client.resolve_link(link), Err(ApiError::InvalidUrl(_))), "{}", link);
        }
    }
}
