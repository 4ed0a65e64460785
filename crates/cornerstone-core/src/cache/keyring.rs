use anyhow::{Context, Result};
use async_trait::async_trait;
use keyring::Entry;

use super::CacheBackend;

/// Stores each key as an OS keychain entry `(service, "<namespace>/<key>")`.
///
/// Keychain calls block, so they run on the blocking thread pool. A write is
/// read back before it counts as stored: a store that silently drops entries
/// (keyring's mock store, a locked collection) reports an error instead, so
/// the fallback store takes over.
pub struct KeyringCache {
    service: String,
    namespace: String,
}

impl KeyringCache {
    pub fn new(service: String, namespace: &str) -> Self {
        Self {
            service,
            namespace: namespace.to_string(),
        }
    }

    fn account(&self, key: &str) -> String {
        format!("{}/{}", self.namespace, key)
    }
}

fn read(service: &str, account: &str) -> Result<Option<String>> {
    let entry = Entry::new(service, account).context("Failed to create keyring entry")?;
    match entry.get_password() {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(e).context("Failed to read credential from keychain"),
    }
}

#[async_trait]
impl CacheBackend for KeyringCache {
    fn name(&self) -> &'static str {
        "keyring"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let service = self.service.clone();
        let account = self.account(key);
        tokio::task::spawn_blocking(move || read(&service, &account))
            .await
            .context("Keychain read task failed")?
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let service = self.service.clone();
        let account = self.account(key);
        let value = value.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let entry = Entry::new(&service, &account).context("Failed to create keyring entry")?;
            entry
                .set_password(&value)
                .context("Failed to store credential in keychain")?;
            if read(&service, &account)?.as_deref() != Some(value.as_str()) {
                anyhow::bail!("Keychain did not retain the entry for {}", account);
            }
            Ok(())
        })
        .await
        .context("Keychain write task failed")?
    }
}
