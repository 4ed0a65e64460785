//! Pluggable credential storage.
//!
//! A `CacheBackend` is a plain string key/value store. Values are whole
//! serialized credentials and a `put` always replaces the previous value.
//!
//! Backends:
//! - `FileCache`: one JSON file per key in a local directory
//! - `KeyringCache`: OS keychain entries
//! - `DynamoDbCache`: one item per key in a DynamoDB table (`dynamodb` feature)
//!
//! Durable backends are wrapped in a `FallbackCache` so an unreachable store
//! degrades to the local file cache instead of failing requests.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::CacheConfig;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;
pub mod fallback;
pub mod file;
pub mod keyring;

#[cfg(feature = "dynamodb")]
pub use self::dynamodb::DynamoDbCache;
pub use fallback::FallbackCache;
pub use file::FileCache;
pub use self::keyring::KeyringCache;

#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name used in logs to say which store is active.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`.
    async fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// Build the backend selected by `config`.
///
/// `cache_dir` should already be specific to the identity. Keychain accounts
/// and DynamoDB keys are prefixed with `namespace` for the same reason.
///
/// A DynamoDB selection without region or store name, or in a build without
/// the `dynamodb` feature, falls back to the file cache in `cache_dir`.
pub fn build_backend(config: &CacheConfig, cache_dir: PathBuf, namespace: &str) -> Arc<dyn CacheBackend> {
    let backend: Arc<dyn CacheBackend> = match config {
        CacheConfig::File => Arc::new(FileCache::new(cache_dir)),
        CacheConfig::Keyring { service } => Arc::new(FallbackCache::new(
            Box::new(KeyringCache::new(service.clone(), namespace)),
            FileCache::new(cache_dir),
        )),
        CacheConfig::DynamoDb { region, store_name } => {
            if region.trim().is_empty() || store_name.trim().is_empty() {
                warn!("DynamoDB cache selected without region or store name, using file cache");
                Arc::new(FileCache::new(cache_dir))
            } else {
                durable_store(region, store_name, cache_dir, namespace)
            }
        }
    };
    info!(backend = backend.name(), "Token cache backend selected");
    backend
}

#[cfg(feature = "dynamodb")]
fn durable_store(region: &str, store_name: &str, cache_dir: PathBuf, namespace: &str) -> Arc<dyn CacheBackend> {
    Arc::new(FallbackCache::new(
        Box::new(DynamoDbCache::new(region, store_name, namespace)),
        FileCache::new(cache_dir),
    ))
}

#[cfg(not(feature = "dynamodb"))]
fn durable_store(region: &str, store_name: &str, cache_dir: PathBuf, _namespace: &str) -> Arc<dyn CacheBackend> {
    warn!(
        region = region,
        store = store_name,
        "Built without the dynamodb feature, using file cache"
    );
    Arc::new(FileCache::new(cache_dir))
}
