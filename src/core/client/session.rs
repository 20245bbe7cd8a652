use std::sync::Arc;

use kube::{Api, Client};
use tracing::debug;

use super::kube_client::build_kube_client;
use super::kube_resources::{Pod, Service};
use super::rate_limiter::RateLimiter;
use crate::core::config::ResolvedConnection;
use crate::core::discovery::cached_client::CachedDiscoveryClient;
use crate::core::discovery::disk_cache::{CacheLayout, DiscoveryCache};
use crate::core::discovery::fetcher::KubeDiscoveryFetcher;
use crate::core::discovery::http_cache::HttpCache;
use crate::core::discovery::rest_mapper::DeferredRestMapper;
use crate::errors::{discovery_error, ProviderResult};

/// Ready-to-use connection bundle handed to every read operation.
///
/// Cloning is cheap; clones share the client and the request budget.
#[derive(Clone)]
pub struct ClusterSession {
    connection: Arc<ResolvedConnection>,
    client: Client,
    limiter: RateLimiter,
    cache_layout: Option<CacheLayout>,
}

impl ClusterSession {
    pub async fn connect(connection: ResolvedConnection) -> ProviderResult<Self> {
        let client = build_kube_client(&connection).await?;
        Ok(Self::from_parts(connection, client))
    }

    pub fn from_parts(connection: ResolvedConnection, client: Client) -> Self {
        let limiter = RateLimiter::new(connection.rate_limit);
        Self {
            connection: Arc::new(connection),
            client,
            limiter,
            cache_layout: None,
        }
    }

    /// Root the discovery cache somewhere other than `~/.kube`.
    pub fn with_cache_layout(mut self, layout: CacheLayout) -> Self {
        self.cache_layout = Some(layout);
        self
    }

    pub fn connection(&self) -> &ResolvedConnection {
        &self.connection
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Wait for a slot in the client-side request budget.
    pub async fn throttle(&self) {
        self.limiter.acquire().await;
    }

    pub fn cache_layout(&self) -> ProviderResult<CacheLayout> {
        match &self.cache_layout {
            Some(layout) => Ok(layout.clone()),
            None => CacheLayout::user_default().map_err(discovery_error),
        }
    }

    pub fn discovery_client(&self) -> ProviderResult<CachedDiscoveryClient<KubeDiscoveryFetcher>> {
        let layout = self.cache_layout()?;
        let cache = DiscoveryCache::for_host(&layout, self.connection.host());
        debug!("Using discovery cache at {:?}", cache.dir());
        let http_cache = HttpCache::for_host(&layout, self.connection.host());
        let fetcher = KubeDiscoveryFetcher::new(self.client.clone(), self.limiter.clone())
            .with_http_cache(http_cache);
        Ok(CachedDiscoveryClient::new(fetcher, cache))
    }

    /// Built on demand; nothing is fetched until the first lookup.
    pub fn rest_mapper(&self) -> ProviderResult<DeferredRestMapper<KubeDiscoveryFetcher>> {
        Ok(DeferredRestMapper::new(self.discovery_client()?))
    }
}
