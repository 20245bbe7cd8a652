use async_trait::async_trait;
use http::header::{ETAG, IF_NONE_MATCH};
use http::{Request, StatusCode};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIGroupList, APIResourceList, APIVersions};
use kube::client::Body;
use kube::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::http_cache::{revalidate, HttpCache, Revalidated};
use crate::core::client::rate_limiter::RateLimiter;
use crate::errors::{discovery_error, ProviderResult};

/// One API group and the versions the server offers for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    pub name: String,
    pub versions: Vec<String>,
    pub preferred_version: Option<String>,
}

impl GroupEntry {
    /// Versions with the preferred one first.
    pub fn ordered_versions(&self) -> Vec<String> {
        let mut versions = self.versions.clone();
        if let Some(preferred) = &self.preferred_version {
            if let Some(pos) = versions.iter().position(|v| v == preferred) {
                let v = versions.remove(pos);
                versions.insert(0, v);
            }
        }
        versions
    }

    pub fn group_version(&self, version: &str) -> String {
        format!("{}/{}", self.name, version)
    }
}

/// `servergroups.json`: the legacy core versions plus every named group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerGroups {
    pub core_versions: Vec<String>,
    pub groups: Vec<GroupEntry>,
}

impl ServerGroups {
    pub fn from_api(core: APIVersions, groups: APIGroupList) -> Self {
        Self {
            core_versions: core.versions,
            groups: groups
                .groups
                .into_iter()
                .map(|g| GroupEntry {
                    versions: g.versions.into_iter().map(|v| v.version).collect(),
                    preferred_version: g.preferred_version.map(|v| v.version),
                    name: g.name,
                })
                .collect(),
        }
    }

    /// Every group-version, core first, preferred versions ahead of the rest.
    pub fn group_versions(&self) -> Vec<String> {
        let mut out = self.core_versions.clone();
        for group in &self.groups {
            out.extend(group.ordered_versions().iter().map(|v| group.group_version(v)));
        }
        out
    }
}

/// One resource entry of a group-version listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub name: String,
    pub singular_name: String,
    pub kind: String,
    pub namespaced: bool,
    #[serde(default)]
    pub short_names: Vec<String>,
    #[serde(default)]
    pub verbs: Vec<String>,
}

/// `<group>/<version>/serverresources.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceList {
    pub group_version: String,
    pub resources: Vec<ResourceEntry>,
}

impl From<APIResourceList> for ResourceList {
    fn from(list: APIResourceList) -> Self {
        Self {
            group_version: list.group_version,
            resources: list
                .resources
                .into_iter()
                .map(|r| ResourceEntry {
                    name: r.name,
                    singular_name: r.singular_name,
                    kind: r.kind,
                    namespaced: r.namespaced,
                    short_names: r.short_names.unwrap_or_default(),
                    verbs: r.verbs,
                })
                .collect(),
        }
    }
}

/// Source of live discovery documents.
#[async_trait]
pub trait DiscoveryFetcher: Send + Sync {
    async fn server_groups(&self) -> ProviderResult<ServerGroups>;

    async fn server_resources(&self, group_version: &str) -> ProviderResult<ResourceList>;
}

/// Fetches discovery documents from the cluster through the kube client.
///
/// With an [`HttpCache`] attached, every request carries the stored ETag and
/// a `304 Not Modified` is answered from disk.
#[derive(Clone)]
pub struct KubeDiscoveryFetcher {
    client: Client,
    limiter: RateLimiter,
    http_cache: Option<HttpCache>,
}

/// Request path for one group-version's resource list.
pub fn server_resources_url(group_version: &str) -> String {
    if group_version.contains('/') {
        format!("/apis/{}", group_version)
    } else {
        format!("/api/{}", group_version)
    }
}

impl KubeDiscoveryFetcher {
    pub fn new(client: Client, limiter: RateLimiter) -> Self {
        Self {
            client,
            limiter,
            http_cache: None,
        }
    }

    pub fn with_http_cache(mut self, cache: HttpCache) -> Self {
        self.http_cache = Some(cache);
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ProviderResult<T> {
        self.limiter.acquire().await;

        let cached = self.http_cache.as_ref().and_then(|c| c.get(path));
        let mut request = Request::builder().uri(path);
        if let Some(entry) = &cached {
            request = request.header(IF_NONE_MATCH, entry.etag.as_str());
        }
        let request = request.body(Body::empty()).map_err(discovery_error)?;

        let response = self.client.send(request).await.map_err(discovery_error)?;
        let status = response.status();
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .into_body()
            .collect_bytes()
            .await
            .map_err(discovery_error)?;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        let body = match revalidate(status, etag.as_deref(), body, cached) {
            Revalidated::Body { body, store } => {
                if status == StatusCode::NOT_MODIFIED {
                    debug!("{} not modified, served from http cache", path);
                }
                if let (Some(cache), Some(entry)) = (&self.http_cache, store) {
                    if let Err(e) = cache.put(path, &entry) {
                        warn!("Failed to write http cache entry for {}: {:#}", path, e);
                    }
                }
                body
            }
            Revalidated::Failed { status, body } => {
                return Err(discovery_error(format!("GET {} returned {}: {}", path, status, body)));
            }
        };

        serde_json::from_str(&body).map_err(|e| discovery_error(format!("GET {}: {}", path, e)))
    }
}

#[async_trait]
impl DiscoveryFetcher for KubeDiscoveryFetcher {
    async fn server_groups(&self) -> ProviderResult<ServerGroups> {
        let core: APIVersions = self.get_json("/api").await?;
        let groups: APIGroupList = self.get_json("/apis").await?;

        debug!("Fetched {} API group(s) from the cluster", groups.groups.len());
        Ok(ServerGroups::from_api(core, groups))
    }

    async fn server_resources(&self, group_version: &str) -> ProviderResult<ResourceList> {
        let list: APIResourceList = self.get_json(&server_resources_url(group_version)).await?;

        debug!(
            "Fetched {} resource(s) for {}",
            list.resources.len(),
            group_version
        );
        Ok(list.into())
    }
}
