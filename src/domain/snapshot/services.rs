use async_trait::async_trait;
use k8s_openapi::Resource as _;
use serde::Serialize;
use serde_json::{Map, Value};

use super::flatten::{common_fields, RecordBuilder};
use super::identity::IdentityPolicy;
use super::kind::SnapshotKind;
use super::record::SnapshotScope;
use crate::core::client::kube_resources::{LoadBalancerIngress, Service, ServicePort};
use crate::core::client::services::fetch_services_by_namespace;
use crate::core::client::session::ClusterSession;
use crate::errors::ProviderResult;

pub struct ServiceSnapshot;

#[derive(Debug, Serialize)]
struct IngressEntry {
    ip: String,
    hostname: String,
}

#[derive(Debug, Serialize)]
struct PortEntry {
    port: i32,
    node_port: i32,
    protocol: String,
    name: String,
}

impl From<&LoadBalancerIngress> for IngressEntry {
    fn from(ingress: &LoadBalancerIngress) -> Self {
        Self {
            ip: ingress.ip.clone().unwrap_or_default(),
            hostname: ingress.hostname.clone().unwrap_or_default(),
        }
    }
}

impl From<&ServicePort> for PortEntry {
    fn from(port: &ServicePort) -> Self {
        Self {
            port: port.port,
            node_port: port.node_port.unwrap_or_default(),
            protocol: port.protocol.clone().unwrap_or_default(),
            name: port.name.clone().unwrap_or_default(),
        }
    }
}

impl IngressEntry {
    /// IP when present, else hostname. Entries with neither are not addressable.
    fn address(&self) -> Option<&str> {
        if !self.ip.is_empty() {
            Some(&self.ip)
        } else if !self.hostname.is_empty() {
            Some(&self.hostname)
        } else {
            None
        }
    }
}

/// `address:port` for every port and every ingress address, ports outermost.
fn external_addresses(ports: &[PortEntry], ingress: &[IngressEntry]) -> Vec<String> {
    let prefixes: Vec<&str> = ingress.iter().filter_map(IngressEntry::address).collect();
    ports
        .iter()
        .flat_map(|p| prefixes.iter().map(move |prefix| format!("{prefix}:{}", p.port)))
        .collect()
}

#[async_trait]
impl SnapshotKind for ServiceSnapshot {
    const KIND: &'static str = "services";
    const IDENTITY: IdentityPolicy = IdentityPolicy::ContentAddressed;

    type Object = Service;

    async fn fetch(session: &ClusterSession, scope: &SnapshotScope) -> ProviderResult<Vec<Service>> {
        fetch_services_by_namespace(session, &scope.namespace).await
    }

    fn flatten(service: &Service) -> ProviderResult<Map<String, Value>> {
        let mut builder = RecordBuilder::new();
        common_fields(&mut builder, Service::KIND, &service.metadata, service.status.as_ref())?;

        let spec = service.spec.clone().unwrap_or_default();
        let ingress: Vec<IngressEntry> = service
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .map(|list| list.iter().map(IngressEntry::from).collect())
            .unwrap_or_default();
        let ports: Vec<PortEntry> = spec
            .ports
            .as_ref()
            .map(|list| list.iter().map(PortEntry::from).collect())
            .unwrap_or_default();

        builder
            .set("type", &spec.type_.unwrap_or_default())?
            .set("external_ips", &spec.external_ips.unwrap_or_default())?
            .set("load_balancer_ip", &spec.load_balancer_ip.unwrap_or_default())?
            .set(
                "external_traffic_policy",
                &spec.external_traffic_policy.unwrap_or_default(),
            )?
            .set("external_name", &spec.external_name.unwrap_or_default())?
            .set(
                "load_balancer_source_ranges",
                &spec.load_balancer_source_ranges.unwrap_or_default(),
            )?
            .set("external_addresses", &external_addresses(&ports, &ingress))?
            .set("ingress", &ingress)?
            .set("ports", &ports)?;
        Ok(builder.build())
    }
}
