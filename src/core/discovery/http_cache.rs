//! ETag-revalidating response cache for discovery requests.
//!
//! Sits underneath the discovery cache: once a discovery document passes its
//! TTL the request is sent with `If-None-Match`, and a `304 Not Modified`
//! reuses the body stored here instead of transferring it again.
//!
//! Layout, one directory per cluster host, one file per request path:
//! ```text
//! ~/.kube/http-cache/<key>/<sha256 of path>
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::cache_key::DiscoveryCacheKey;
use super::disk_cache::{atomic_write, CacheLayout};

/// A stored response body and the validator the server sent with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub etag: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct HttpCache {
    dir: PathBuf,
}

impl HttpCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn for_host(layout: &CacheLayout, host: &str) -> Self {
        Self::new(DiscoveryCacheKey::from_host(host).dir_under(&layout.http_cache_dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, path: &str) -> PathBuf {
        self.dir.join(hex::encode(Sha256::digest(path.as_bytes())))
    }

    /// Unreadable or unparsable entries are misses.
    pub fn get(&self, path: &str) -> Option<CachedResponse> {
        let content = fs::read(self.entry_path(path)).ok()?;
        match serde_json::from_slice(&content) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Ignoring unreadable http cache entry for {}: {}", path, e);
                None
            }
        }
    }

    pub fn put(&self, path: &str, entry: &CachedResponse) -> Result<()> {
        let content = serde_json::to_vec(entry).context("Failed to serialize http cache entry")?;
        atomic_write(&self.entry_path(path), &content)
    }
}

/// What to do with a discovery response given the cached entry it was validated against.
#[derive(Debug, PartialEq, Eq)]
pub enum Revalidated {
    /// Use this body; `store` is the entry to write back, if any.
    Body { body: String, store: Option<CachedResponse> },
    /// The server answered with an error status.
    Failed { status: StatusCode, body: String },
}

/// Settle a response against the cached entry its request carried an `If-None-Match` for.
pub fn revalidate(
    status: StatusCode,
    etag: Option<&str>,
    body: String,
    cached: Option<CachedResponse>,
) -> Revalidated {
    if status == StatusCode::NOT_MODIFIED {
        return match cached {
            Some(entry) => Revalidated::Body {
                body: entry.body,
                store: None,
            },
            None => Revalidated::Failed {
                status,
                body: "not modified, but nothing is cached".to_string(),
            },
        };
    }
    if !status.is_success() {
        return Revalidated::Failed { status, body };
    }

    let store = etag.filter(|e| !e.is_empty()).map(|etag| CachedResponse {
        etag: etag.to_string(),
        body: body.clone(),
    });
    Revalidated::Body { body, store }
}
