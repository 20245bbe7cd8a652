use std::path::Path;

use tracing::{debug, warn};

use super::disk_cache::{server_resources_path, DiscoveryCache, SERVER_GROUPS_FILE};
use super::fetcher::{DiscoveryFetcher, ResourceList, ServerGroups};
use crate::errors::ProviderResult;

/// Discovery client that serves documents from disk while they are fresh.
///
/// A failed cache write is logged and ignored: the document was fetched fine,
/// the next invocation simply fetches it again.
pub struct CachedDiscoveryClient<F: DiscoveryFetcher> {
    fetcher: F,
    cache: DiscoveryCache,
    invalidated: bool,
    served_from_disk: bool,
}

impl<F: DiscoveryFetcher> CachedDiscoveryClient<F> {
    pub fn new(fetcher: F, cache: DiscoveryCache) -> Self {
        Self {
            fetcher,
            cache,
            invalidated: false,
            served_from_disk: false,
        }
    }

    /// True if nothing served so far came from the disk cache.
    pub fn fresh(&self) -> bool {
        !self.served_from_disk
    }

    /// Bypass the disk for every later read; refetched documents overwrite it.
    pub fn invalidate(&mut self) {
        debug!("Invalidating discovery cache at {:?}", self.cache.dir());
        self.invalidated = true;
        self.served_from_disk = false;
    }

    pub async fn server_groups(&mut self) -> ProviderResult<ServerGroups> {
        let rel = Path::new(SERVER_GROUPS_FILE);
        if let Some(doc) = self.read_cached(rel) {
            return Ok(doc);
        }
        let doc = self.fetcher.server_groups().await?;
        self.store(rel, &doc);
        Ok(doc)
    }

    pub async fn server_resources(&mut self, group_version: &str) -> ProviderResult<ResourceList> {
        let rel = server_resources_path(group_version);
        if let Some(doc) = self.read_cached(&rel) {
            return Ok(doc);
        }
        let doc = self.fetcher.server_resources(group_version).await?;
        self.store(&rel, &doc);
        Ok(doc)
    }

    fn read_cached<T: serde::de::DeserializeOwned>(&mut self, rel: &Path) -> Option<T> {
        if self.invalidated {
            return None;
        }
        let doc = self.cache.read_fresh(rel)?;
        debug!("Discovery cache hit for {:?}", rel);
        self.served_from_disk = true;
        Some(doc)
    }

    fn store<T: serde::Serialize>(&self, rel: &Path, doc: &T) {
        if let Err(e) = self.cache.write(rel, doc) {
            warn!("Failed to write discovery cache entry {:?}: {:#}", rel, e);
        }
    }
}
