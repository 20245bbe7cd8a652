use kube::core::{ApiResource, GroupVersionKind};
use serde::Serialize;
use tracing::{debug, warn};

use super::cached_client::CachedDiscoveryClient;
use super::fetcher::{DiscoveryFetcher, ResourceList, ServerGroups};
use crate::errors::{ProviderError, ProviderResult};

/// Where one kind lives on the API server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceMapping {
    /// Empty for the legacy core group.
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub singular: String,
    pub short_names: Vec<String>,
    pub namespaced: bool,
}

impl ResourceMapping {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// REST collection path, e.g. `/apis/apps/v1/namespaces/web/deployments`.
    ///
    /// The namespace is ignored for cluster-scoped kinds.
    pub fn rest_path(&self, namespace: Option<&str>) -> String {
        let prefix = if self.group.is_empty() {
            format!("/api/{}", self.version)
        } else {
            format!("/apis/{}/{}", self.group, self.version)
        };
        match namespace {
            Some(ns) if self.namespaced && !ns.is_empty() => {
                format!("{}/namespaces/{}/{}", prefix, ns, self.plural)
            }
            _ => format!("{}/{}", prefix, self.plural),
        }
    }

    pub fn api_resource(&self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(&self.group, &self.version, &self.kind);
        ApiResource::from_gvk_with_plural(&gvk, &self.plural)
    }

    fn matches(&self, resource: &str, group: Option<&str>, version: Option<&str>) -> bool {
        if group.is_some_and(|g| g != self.group) || version.is_some_and(|v| v != self.version) {
            return false;
        }
        self.plural == resource || self.singular == resource || self.kind.to_lowercase() == resource
    }
}

/// Kind/alias → mapping table built from discovery documents.
///
/// Entries keep discovery order: core group first, preferred versions first.
#[derive(Debug, Clone, Default)]
pub struct RestMapper {
    mappings: Vec<ResourceMapping>,
}

impl RestMapper {
    pub fn from_discovery(lists: &[ResourceList]) -> Self {
        let mut mappings = Vec::new();
        for list in lists {
            let (group, version) = match list.group_version.split_once('/') {
                Some((g, v)) => (g.to_string(), v.to_string()),
                None => (String::new(), list.group_version.clone()),
            };
            for r in &list.resources {
                // subresources such as pods/log are not addressable kinds
                if r.name.contains('/') {
                    continue;
                }
                mappings.push(ResourceMapping {
                    group: group.clone(),
                    version: version.clone(),
                    kind: r.kind.clone(),
                    plural: r.name.clone(),
                    singular: if r.singular_name.is_empty() {
                        r.kind.to_lowercase()
                    } else {
                        r.singular_name.clone()
                    },
                    short_names: r.short_names.clone(),
                    namespaced: r.namespaced,
                });
            }
        }
        Self { mappings }
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Expand a short name (`deploy`, `svc`) into `plural[.group]`; other input passes through.
    pub fn expand_shortcut(&self, name: &str) -> String {
        let lowered = name.to_lowercase();
        self.mappings
            .iter()
            .find(|m| m.short_names.iter().any(|s| *s == lowered))
            .map(|m| {
                if m.group.is_empty() {
                    m.plural.clone()
                } else {
                    format!("{}.{}", m.plural, m.group)
                }
            })
            .unwrap_or(lowered)
    }

    /// Resolve a kind, plural, singular or short name, optionally qualified
    /// as `name.group` or `name.version.group`.
    pub fn mapping_for(&self, name: &str) -> Option<&ResourceMapping> {
        let expanded = self.expand_shortcut(name);
        let Some((resource, qualifier)) = expanded.split_once('.') else {
            return self.mappings.iter().find(|m| m.matches(&expanded, None, None));
        };

        self.mappings
            .iter()
            .find(|m| m.matches(resource, Some(qualifier), None))
            .or_else(|| {
                let (version, group) = qualifier.split_once('.')?;
                self.mappings
                    .iter()
                    .find(|m| m.matches(resource, Some(group), Some(version)))
            })
    }
}

/// Mapper that loads discovery lazily and reloads once when a lookup misses
/// on data that came from the disk cache.
pub struct DeferredRestMapper<F: DiscoveryFetcher> {
    client: CachedDiscoveryClient<F>,
    delegate: Option<RestMapper>,
}

impl<F: DiscoveryFetcher> DeferredRestMapper<F> {
    pub fn new(client: CachedDiscoveryClient<F>) -> Self {
        Self {
            client,
            delegate: None,
        }
    }

    pub async fn mapping_for(&mut self, name: &str) -> ProviderResult<ResourceMapping> {
        if let Some(found) = self.loaded().await?.mapping_for(name) {
            return Ok(found.clone());
        }

        if self.client.fresh() {
            return Err(no_match(name));
        }

        debug!("No mapping for '{}' in cached discovery, refreshing", name);
        self.reset();
        self.loaded()
            .await?
            .mapping_for(name)
            .cloned()
            .ok_or_else(|| no_match(name))
    }

    /// Drop the loaded table and force the next lookup to refetch.
    pub fn reset(&mut self) {
        self.client.invalidate();
        self.delegate = None;
    }

    async fn loaded(&mut self) -> ProviderResult<&RestMapper> {
        if self.delegate.is_none() {
            let mapper = load_mapper(&mut self.client).await?;
            debug!("Built REST mapper with {} kind(s)", mapper.len());
            self.delegate = Some(mapper);
        }
        self.delegate
            .as_ref()
            .ok_or_else(|| ProviderError::Discovery("REST mapper not loaded".to_string()))
    }
}

/// The group list must load; a single broken group-version (often an
/// aggregated API whose backend is down) is skipped with a warning.
async fn load_mapper<F: DiscoveryFetcher>(client: &mut CachedDiscoveryClient<F>) -> ProviderResult<RestMapper> {
    let groups: ServerGroups = client.server_groups().await?;
    let mut lists = Vec::new();
    let mut last_error = None;

    for group_version in groups.group_versions() {
        match client.server_resources(&group_version).await {
            Ok(list) => lists.push(list),
            Err(e) => {
                warn!("Skipping {} during discovery: {}", group_version, e);
                last_error = Some(e);
            }
        }
    }

    if lists.is_empty() {
        if let Some(e) = last_error {
            return Err(e);
        }
    }
    Ok(RestMapper::from_discovery(&lists))
}

fn no_match(name: &str) -> ProviderError {
    ProviderError::Discovery(format!("no matches for kind \"{}\"", name))
}
