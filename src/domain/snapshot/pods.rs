use async_trait::async_trait;
use k8s_openapi::Resource as _;
use serde_json::{Map, Value};

use super::flatten::{common_fields, RecordBuilder};
use super::identity::IdentityPolicy;
use super::kind::SnapshotKind;
use super::record::SnapshotScope;
use crate::core::client::kube_resources::Pod;
use crate::core::client::pods::fetch_pods_by_namespace;
use crate::core::client::session::ClusterSession;
use crate::errors::ProviderResult;

pub struct PodSnapshot;

#[async_trait]
impl SnapshotKind for PodSnapshot {
    const KIND: &'static str = "pods";
    const IDENTITY: IdentityPolicy = IdentityPolicy::ContentAddressed;

    type Object = Pod;

    async fn fetch(session: &ClusterSession, scope: &SnapshotScope) -> ProviderResult<Vec<Pod>> {
        fetch_pods_by_namespace(session, &scope.namespace).await
    }

    fn flatten(pod: &Pod) -> ProviderResult<Map<String, Value>> {
        let mut builder = RecordBuilder::new();
        common_fields(&mut builder, Pod::KIND, &pod.metadata, pod.status.as_ref())?;

        let status = pod.status.as_ref();
        builder
            .set("phase", &status.and_then(|s| s.phase.clone()).unwrap_or_default())?
            .set("pod_ip", &status.and_then(|s| s.pod_ip.clone()).unwrap_or_default())?
            .set("host_ip", &status.and_then(|s| s.host_ip.clone()).unwrap_or_default())?
            .set(
                "node_name",
                &pod.spec.as_ref().and_then(|s| s.node_name.clone()).unwrap_or_default(),
            )?;
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::kube_resources::{ObjectMeta, PodStatus};
    use crate::domain::snapshot::kind::assemble;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn pod(name: &str, phase: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("default".into()),
                uid: Some(format!("uid-{name}")),
                resource_version: Some("7".into()),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some(phase.into()),
                pod_ip: Some("10.0.0.5".into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn flattens_common_and_pod_fields() {
        let record = PodSnapshot::flatten(&pod("web-0", "Running")).unwrap();
        assert_eq!(record["kind"], "Pod");
        assert_eq!(record["name"], "web-0");
        assert_eq!(record["phase"], "Running");
        assert_eq!(record["pod_ip"], "10.0.0.5");
        assert_eq!(record["node_name"], "");
        assert!(record["status"].as_str().unwrap().contains("Running"));
    }

    #[test]
    fn identical_clusters_produce_identical_ids() {
        let pods = vec![pod("web-0", "Running"), pod("web-1", "Running")];
        let first = assemble::<PodSnapshot>(&pods, BTreeMap::new(), Utc::now()).unwrap();
        let second = assemble::<PodSnapshot>(&pods, BTreeMap::new(), Utc::now()).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.items("pods").len(), 2);
    }

    #[test]
    fn phase_change_changes_identity() {
        let before = assemble::<PodSnapshot>(&[pod("web-0", "Pending")], BTreeMap::new(), Utc::now()).unwrap();
        let after = assemble::<PodSnapshot>(&[pod("web-0", "Running")], BTreeMap::new(), Utc::now()).unwrap();
        assert_ne!(before.id, after.id);
    }

    #[test]
    fn empty_namespace_yields_empty_list_with_identity() {
        let record = assemble::<PodSnapshot>(&[], BTreeMap::new(), Utc::now()).unwrap();
        assert!(record.items("pods").is_empty());
        assert!(!record.id.is_empty());
    }
}
