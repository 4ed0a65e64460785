use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use super::{CacheBackend, FileCache};

/// A durable store backed by a local file cache.
///
/// When the primary store errors, the operation is retried against the file
/// cache and a warning names both stores. A miss in the primary store is
/// also looked up in the file cache, which holds whatever was written while
/// the primary was failing. The primary store's name is what `name()` reports.
pub struct FallbackCache {
    primary: Box<dyn CacheBackend>,
    fallback: FileCache,
}

impl FallbackCache {
    pub fn new(primary: Box<dyn CacheBackend>, fallback: FileCache) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl CacheBackend for FallbackCache {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.primary.get(key).await {
            Ok(Some(value)) => Ok(Some(value)),
            Ok(None) => self.fallback.get(key).await,
            Err(e) => {
                warn!(
                    key = key,
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %format!("{:#}", e),
                    "Token cache read failed, using fallback store"
                );
                self.fallback.get(key).await
            }
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        match self.primary.put(key, value).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    key = key,
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %format!("{:#}", e),
                    "Token cache write failed, using fallback store"
                );
                self.fallback.put(key, value).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unreachable;

    #[async_trait]
    impl CacheBackend for Unreachable {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        async fn get(&self, _key: &str) -> Result<Option<String>> {
            anyhow::bail!("connection refused")
        }

        async fn put(&self, _key: &str, _value: &str) -> Result<()> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn test_unreachable_primary_uses_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FallbackCache::new(Box::new(Unreachable), FileCache::new(dir.path().to_path_buf()));

        cache.put("session", "{}").await.unwrap();
        assert_eq!(cache.get("session").await.unwrap().as_deref(), Some("{}"));
        assert!(dir.path().join("session.json").exists());
        assert_eq!(cache.name(), "unreachable");
    }

    /// Accepts writes, never returns anything.
    struct Forgetful;

    #[async_trait]
    impl CacheBackend for Forgetful {
        fn name(&self) -> &'static str {
            "forgetful"
        }

        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn put(&self, _key: &str, _value: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_primary_miss_reads_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileCache::new(dir.path().to_path_buf());
        file.put("session", "{\"token\":\"t\"}").await.unwrap();

        let cache = FallbackCache::new(Box::new(Forgetful), FileCache::new(dir.path().to_path_buf()));
        assert_eq!(cache.get("session").await.unwrap().as_deref(), Some("{\"token\":\"t\"}"));
        assert!(cache.get("employee:read").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_healthy_primary_bypasses_file_store() {
        let primary_dir = tempfile::tempdir().unwrap();
        let fallback_dir = tempfile::tempdir().unwrap();
        let cache = FallbackCache::new(
            Box::new(FileCache::new(primary_dir.path().to_path_buf())),
            FileCache::new(fallback_dir.path().to_path_buf()),
        );

        cache.put("session", "{}").await.unwrap();
        assert!(primary_dir.path().join("session.json").exists());
        assert!(!fallback_dir.path().join("session.json").exists());
    }
}
