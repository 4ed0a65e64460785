//! Client configuration.
//!
//! A `ClientConfig` names one API identity (key pair + tenant), the token
//! cache backend and a few transport settings. It can be built in code,
//! loaded from a JSON file, or read from `CSOD_*` environment variables
//! (a `.env` file is honoured).

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;

/// Application name used for the default cache directory
const APP_NAME: &str = "cornerstone-client";

/// Tenant URL; `{corpname}` is replaced by the identity's corpname.
pub const DEFAULT_BASE_URL: &str = "https://{corpname}.csod.com";

/// Network timeout for every call, authentication included.
const DEFAULT_TIMEOUT_SECS: u64 = 50;

/// Value sent in `Prefer: odata.maxpagesize=<n>`.
const DEFAULT_MAX_PAGE_SIZE: u32 = 5000;

/// API key pair and tenant the client authenticates as.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub api_id: String,
    pub api_secret: String,
    pub corpname: String,
    /// Required for session-style authentication only.
    #[serde(default)]
    pub username: Option<String>,
    /// Session alias prefix; a timestamp is appended on every session request.
    #[serde(default)]
    pub alias: Option<String>,
}

impl Identity {
    pub fn new(api_id: impl Into<String>, api_secret: impl Into<String>, corpname: impl Into<String>) -> Self {
        Self {
            api_id: api_id.into(),
            api_secret: api_secret.into(),
            corpname: corpname.into(),
            username: None,
            alias: None,
        }
    }

    pub fn with_session_user(mut self, username: impl Into<String>, alias: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.alias = Some(alias.into());
        self
    }

    /// Username and alias, which session creation cannot do without.
    pub fn session_fields(&self) -> Result<(&str, &str), AuthError> {
        let username = non_empty(self.username.as_deref())
            .ok_or_else(|| AuthError::Configuration("username is required for session authentication".to_string()))?;
        let alias = non_empty(self.alias.as_deref())
            .ok_or_else(|| AuthError::Configuration("alias is required for session authentication".to_string()))?;
        Ok((username, alias))
    }

    /// Cache namespace for this identity, safe as a path segment.
    ///
    /// Two identities never share cached credentials: each gets its own cache
    /// directory, keychain accounts and store keys under this name.
    pub fn namespace(&self) -> String {
        format!("{}-{}", self.corpname, self.api_id)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("api_id", &self.api_id)
            .field("api_secret", &"<redacted>")
            .field("corpname", &self.corpname)
            .field("username", &self.username)
            .field("alias", &self.alias)
            .finish()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Where credentials are cached between calls (and between processes).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "camelCase")]
pub enum CacheConfig {
    /// One JSON file per cache key in the cache directory.
    #[default]
    File,
    /// OS keychain entries under `service`.
    Keyring { service: String },
    /// One item per cache key in a DynamoDB table (`dynamodb` feature).
    #[serde(rename_all = "camelCase")]
    DynamoDb { region: String, store_name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub identity: Identity,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Directory for the file cache, and for the fallback of durable backends.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
    /// Coalesce concurrent refreshes of the same cache key.
    #[serde(default)]
    pub single_flight: bool,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_page_size() -> u32 {
    DEFAULT_MAX_PAGE_SIZE
}

impl ClientConfig {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            base_url: default_base_url(),
            cache: CacheConfig::default(),
            cache_dir: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            single_flight: false,
        }
    }

    /// Load a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Build a config from `CSOD_*` environment variables.
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();

        let identity = Identity {
            api_id: env_or_default("CSOD_API_ID"),
            api_secret: env_or_default("CSOD_API_SECRET"),
            corpname: env_or_default("CSOD_CORPNAME"),
            username: std::env::var("CSOD_USERNAME").ok(),
            alias: std::env::var("CSOD_ALIAS").ok(),
        };

        let cache = match std::env::var("CSOD_CACHE_BACKEND").ok().as_deref() {
            None | Some("file") => CacheConfig::File,
            Some("keyring") => CacheConfig::Keyring {
                service: std::env::var("CSOD_KEYRING_SERVICE").unwrap_or_else(|_| APP_NAME.to_string()),
            },
            Some("dynamodb") => CacheConfig::DynamoDb {
                region: env_or_default("CSOD_REGION"),
                store_name: env_or_default("CSOD_STORE_NAME"),
            },
            Some(other) => anyhow::bail!("Unknown CSOD_CACHE_BACKEND {:?}", other),
        };

        let mut config = Self::new(identity);
        config.cache = cache;
        if let Ok(base_url) = std::env::var("CSOD_BASE_URL") {
            config.base_url = base_url;
        }
        config.cache_dir = std::env::var_os("CSOD_CACHE_DIR").map(PathBuf::from);
        if let Ok(raw) = std::env::var("CSOD_TIMEOUT_SECS") {
            config.timeout_secs = raw.parse().context("CSOD_TIMEOUT_SECS must be a number of seconds")?;
        }
        if let Ok(raw) = std::env::var("CSOD_MAX_PAGE_SIZE") {
            config.max_page_size = raw.parse().context("CSOD_MAX_PAGE_SIZE must be a positive number")?;
        }
        config.single_flight = matches!(
            std::env::var("CSOD_SINGLE_FLIGHT").ok().as_deref(),
            Some("1" | "true")
        );
        Ok(config)
    }

    /// Check the identity carries everything every authentication style needs.
    pub fn validate(&self) -> Result<(), AuthError> {
        let required = [
            ("apiId", &self.identity.api_id),
            ("apiSecret", &self.identity.api_secret),
            ("corpname", &self.identity.corpname),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(AuthError::Configuration(format!("{} is required", name)));
            }
        }
        Ok(())
    }

    /// Tenant base URL with `{corpname}` substituted.
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .replace("{corpname}", &self.identity.corpname)
            .trim_end_matches('/')
            .to_string()
    }

    /// Cache directory for this identity: `<cache_dir>/<namespace>`, where
    /// `cache_dir` defaults to the user cache dir plus the app name.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        let base = match self.cache_dir {
            Some(ref dir) => dir.clone(),
            None => dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_NAME),
        };
        base.join(self.identity.namespace())
    }
}

fn env_or_default(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}
