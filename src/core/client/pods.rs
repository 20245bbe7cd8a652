use kube::api::ListParams;
use tracing::debug;

use crate::core::client::kube_resources::Pod;
use crate::core::client::session::ClusterSession;
use crate::errors::{ProviderError, ProviderResult};

/// Fetch pods in a specific namespace
pub async fn fetch_pods_by_namespace(session: &ClusterSession, namespace: &str) -> ProviderResult<Vec<Pod>> {
    session.throttle().await;
    let pod_list = session
        .pods(namespace)
        .list(&ListParams::default())
        .await
        .map_err(|e| ProviderError::List {
            kind: "Pod".to_string(),
            namespace: namespace.to_string(),
            message: e.to_string(),
        })?;

    debug!("Discovered {} pod(s) in namespace '{}'", pod_list.items.len(), namespace);
    Ok(pod_list.items)
}
