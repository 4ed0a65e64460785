use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::CacheBackend;

/// Distinguishes temp files of concurrent writers within one process.
static WRITE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stores each key as `<cache_dir>/<key>.json`.
///
/// Writes go to a temp file in the same directory which is then renamed over
/// the entry, so a reader sees either the old value or the new one.
pub struct FileCache {
    cache_dir: PathBuf,
}

impl FileCache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", file_stem(key)))
    }
}

/// Keys are scope strings and may contain `:` or `/`; anything outside
/// `[A-Za-z0-9_-]` is percent-encoded byte by byte.
fn file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(byte as char);
        } else {
            let _ = write!(stem, "%{:02X}", byte);
        }
    }
    stem
}

#[async_trait]
impl CacheBackend for FileCache {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.cache_path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read cache file {}", path.display())),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .with_context(|| format!("Failed to create cache directory {}", self.cache_dir.display()))?;

        let path = self.cache_path(key);
        let tmp = self.cache_dir.join(format!(
            ".{}.{}.{}.tmp",
            file_stem(key),
            std::process::id(),
            WRITE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        tokio::fs::write(&tmp, value)
            .await
            .with_context(|| format!("Failed to write cache file {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("Failed to replace cache file {}", path.display()));
        }
        debug!(path = %path.display(), "Credential written to cache file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem_encodes_unsafe_characters() {
        assert_eq!(file_stem("session"), "session");
        assert_eq!(file_stem("employee:read"), "employee%3Aread");
        assert_eq!(file_stem("../etc"), "%2E%2E%2Fetc");
        assert_ne!(file_stem("a:b"), file_stem("a_b"));
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf());
        assert!(cache.get("session").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_value() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("nested"));

        cache.put("session", r#"{"token":"first"}"#).await.unwrap();
        cache.put("session", r#"{"token":"second"}"#).await.unwrap();

        assert_eq!(
            cache.get("session").await.unwrap().as_deref(),
            Some(r#"{"token":"second"}"#)
        );
        // Only the entry itself remains, no leftover temp files
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("nested")).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(dir.path().join("nested").join("session.json").exists());
    }

    #[tokio::test]
    async fn test_keys_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf());
        cache.put("employee:read", "a").await.unwrap();
        cache.put("employee:write", "b").await.unwrap();
        assert_eq!(cache.get("employee:read").await.unwrap().as_deref(), Some("a"));
        assert_eq!(cache.get("employee:write").await.unwrap().as_deref(), Some("b"));
    }
}
