//! On-disk discovery cache.
//!
//! Layout, one directory per cluster host:
//! ```text
//! ~/.kube/cache/discovery/<key>/
//!   servergroups.json
//!   v1/serverresources.json
//!   apps/v1/serverresources.json
//! ```
//! Freshness is judged from file modification time. Writes replace whole
//! files atomically so parallel invocations never observe a partial document.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use super::cache_key::DiscoveryCacheKey;

/// Discovery documents older than this are refetched.
pub const DISCOVERY_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

pub const SERVER_GROUPS_FILE: &str = "servergroups.json";
pub const SERVER_RESOURCES_FILE: &str = "serverresources.json";

/// Per-user cache roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    pub discovery_root: PathBuf,
    pub http_cache_dir: PathBuf,
}

impl CacheLayout {
    /// `~/.kube/cache/discovery` and `~/.kube/http-cache`.
    pub fn user_default() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("unable to determine home directory"))?;
        Ok(Self::under(&home.join(".kube")))
    }

    pub fn under(kube_dir: &Path) -> Self {
        Self {
            discovery_root: kube_dir.join("cache").join("discovery"),
            http_cache_dir: kube_dir.join("http-cache"),
        }
    }

    pub fn discovery_dir_for(&self, host: &str) -> PathBuf {
        DiscoveryCacheKey::from_host(host).dir_under(&self.discovery_root)
    }
}

/// Relative cache path for one group-version's resource list.
pub fn server_resources_path(group_version: &str) -> PathBuf {
    Path::new(group_version).join(SERVER_RESOURCES_FILE)
}

/// Atomically replace `path` with `content` (tempfile in the same directory + rename).
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow!("cache path {:?} has no parent directory", path))?;
    fs::create_dir_all(dir).with_context(|| format!("Failed to create cache directory {:?}", dir))?;

    let mut tmp = NamedTempFile::new_in(dir).context("Failed to create temp cache file")?;
    tmp.write_all(content)
        .with_context(|| format!("Failed to write temp file {:?}", tmp.path()))?;
    tmp.as_file().sync_all().context("Failed to sync temp cache file")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to persist cache file to {:?}", path))?;
    Ok(())
}

/// Time-bounded JSON document store rooted at one host's cache directory.
#[derive(Debug, Clone)]
pub struct DiscoveryCache {
    dir: PathBuf,
    ttl: Duration,
}

impl DiscoveryCache {
    pub fn new(dir: PathBuf, ttl: Duration) -> Self {
        Self { dir, ttl }
    }

    pub fn for_host(layout: &CacheLayout, host: &str) -> Self {
        Self::new(layout.discovery_dir_for(host), DISCOVERY_CACHE_TTL)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the cached document if it exists, is younger than the TTL and parses.
    ///
    /// Anything else is a miss; a broken file gets overwritten on the next refresh.
    pub fn read_fresh<T: DeserializeOwned>(&self, relative: &Path) -> Option<T> {
        let path = self.dir.join(relative);
        let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        if age >= self.ttl {
            debug!("Discovery cache entry {:?} is stale ({}s old)", path, age.as_secs());
            return None;
        }

        let content = fs::read(&path).ok()?;
        match serde_json::from_slice(&content) {
            Ok(doc) => Some(doc),
            Err(e) => {
                debug!("Ignoring unreadable discovery cache entry {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn write<T: Serialize>(&self, relative: &Path, doc: &T) -> Result<()> {
        let content = serde_json::to_vec(doc).context("Failed to serialize discovery document")?;
        atomic_write(&self.dir.join(relative), &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    #[test]
    fn write_then_read_within_ttl() {
        let tmp = TempDir::new().unwrap();
        let cache = DiscoveryCache::new(tmp.path().join("host"), DISCOVERY_CACHE_TTL);
        let rel = server_resources_path("apps/v1");

        cache.write(&rel, &json!({ "groupVersion": "apps/v1" })).unwrap();

        let doc: Value = cache.read_fresh(&rel).unwrap();
        assert_eq!(doc["groupVersion"], "apps/v1");
        assert!(tmp.path().join("host/apps/v1/serverresources.json").exists());
    }

    #[test]
    fn stale_entries_are_misses() {
        let tmp = TempDir::new().unwrap();
        let cache = DiscoveryCache::new(tmp.path().to_path_buf(), Duration::ZERO);
        let rel = PathBuf::from(SERVER_GROUPS_FILE);
        cache.write(&rel, &json!({})).unwrap();

        assert!(cache.read_fresh::<Value>(&rel).is_none());
    }

    #[test]
    fn corrupt_or_missing_entries_are_misses() {
        let tmp = TempDir::new().unwrap();
        let cache = DiscoveryCache::new(tmp.path().to_path_buf(), DISCOVERY_CACHE_TTL);
        let rel = PathBuf::from(SERVER_GROUPS_FILE);
        assert!(cache.read_fresh::<Value>(&rel).is_none());

        fs::write(tmp.path().join(SERVER_GROUPS_FILE), b"{ half a docu").unwrap();
        assert!(cache.read_fresh::<Value>(&rel).is_none());
    }

    #[test]
    fn overwrite_replaces_whole_file() {
        let tmp = TempDir::new().unwrap();
        let cache = DiscoveryCache::new(tmp.path().to_path_buf(), DISCOVERY_CACHE_TTL);
        let rel = PathBuf::from(SERVER_GROUPS_FILE);

        cache.write(&rel, &json!({ "long": "x".repeat(4096) })).unwrap();
        cache.write(&rel, &json!({ "short": 1 })).unwrap();

        let doc: Value = cache.read_fresh(&rel).unwrap();
        assert_eq!(doc, json!({ "short": 1 }));
        let leftovers: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn concurrent_writers_never_expose_partial_documents() {
        let tmp = TempDir::new().unwrap();
        let cache = DiscoveryCache::new(tmp.path().to_path_buf(), DISCOVERY_CACHE_TTL);
        let rel = PathBuf::from(SERVER_GROUPS_FILE);
        let docs: Vec<Value> = (0..4)
            .map(|i| json!({ "writer": i, "body": i.to_string().repeat(256 * 1024) }))
            .collect();

        std::thread::scope(|scope| {
            for doc in &docs {
                let (cache, rel) = (&cache, &rel);
                scope.spawn(move || {
                    for _ in 0..20 {
                        cache.write(rel, doc).unwrap();
                    }
                });
            }
            for _ in 0..2 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        if let Some(seen) = cache.read_fresh::<Value>(&rel) {
                            assert!(docs.contains(&seen), "read a document no writer produced");
                        }
                    }
                });
            }
        });

        let last: Value = cache.read_fresh(&rel).unwrap();
        assert!(docs.contains(&last));
        let leftovers: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn layout_keys_directories_by_host() {
        let layout = CacheLayout::under(Path::new("/home/u/.kube"));
        assert_eq!(
            layout.discovery_dir_for("https://10.0.0.1:6443"),
            PathBuf::from("/home/u/.kube/cache/discovery/10.0.0.1_6443")
        );
        assert_eq!(layout.http_cache_dir, PathBuf::from("/home/u/.kube/http-cache"));
    }
}
