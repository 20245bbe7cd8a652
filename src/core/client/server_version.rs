use tracing::debug;

use crate::core::client::kube_resources::ServerVersionInfo;
use crate::core::client::session::ClusterSession;
use crate::errors::{ProviderError, ProviderResult};

/// Fetch the API server's `/version` document
pub async fn fetch_server_version(session: &ClusterSession) -> ProviderResult<ServerVersionInfo> {
    session.throttle().await;
    let info = session
        .client()
        .apiserver_version()
        .await
        .map_err(|e| ProviderError::List {
            kind: "ServerVersion".to_string(),
            namespace: String::new(),
            message: e.to_string(),
        })?;

    debug!("API server reports version {}", info.git_version);
    Ok(info)
}
