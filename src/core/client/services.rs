use kube::api::ListParams;
use tracing::debug;

use crate::core::client::kube_resources::Service;
use crate::core::client::session::ClusterSession;
use crate::errors::{ProviderError, ProviderResult};

/// Fetch services in a specific namespace
pub async fn fetch_services_by_namespace(
    session: &ClusterSession,
    namespace: &str,
) -> ProviderResult<Vec<Service>> {
    session.throttle().await;
    let svc_list = session
        .services(namespace)
        .list(&ListParams::default())
        .await
        .map_err(|e| ProviderError::List {
            kind: "Service".to_string(),
            namespace: namespace.to_string(),
            message: e.to_string(),
        })?;

    debug!(
        "Discovered {} service(s) in namespace '{}'",
        svc_list.items.len(),
        namespace
    );
    Ok(svc_list.items)
}
