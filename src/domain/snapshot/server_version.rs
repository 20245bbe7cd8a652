use async_trait::async_trait;
use serde_json::{Map, Value};

use super::flatten::RecordBuilder;
use super::identity::IdentityPolicy;
use super::kind::SnapshotKind;
use super::record::SnapshotScope;
use crate::core::client::kube_resources::ServerVersionInfo;
use crate::core::client::server_version::fetch_server_version;
use crate::core::client::session::ClusterSession;
use crate::errors::{ProviderError, ProviderResult};

/// The API server's `/version` document. Cluster-scoped; the namespace is ignored.
pub struct ServerVersionSnapshot;

/// `major.minor` with provider suffixes such as GKE's `27+` removed.
fn short_version(info: &ServerVersionInfo) -> String {
    format!("{}.{}", info.major, info.minor.trim_end_matches('+'))
}

#[async_trait]
impl SnapshotKind for ServerVersionSnapshot {
    const KIND: &'static str = "server_version";
    const IDENTITY: IdentityPolicy = IdentityPolicy::PointInTime;

    type Object = ServerVersionInfo;

    async fn fetch(session: &ClusterSession, _scope: &SnapshotScope) -> ProviderResult<Vec<ServerVersionInfo>> {
        Ok(vec![fetch_server_version(session).await?])
    }

    fn flatten(info: &ServerVersionInfo) -> ProviderResult<Map<String, Value>> {
        let mut builder = RecordBuilder::new();
        builder
            .set("version", &short_version(info))?
            .set("major", &info.major)?
            .set("minor", &info.minor)?
            .set("git_version", &info.git_version)?
            .set("git_commit", &info.git_commit)?
            .set("git_tree_state", &info.git_tree_state)?
            .set("build_date", &info.build_date)?
            .set("go_version", &info.go_version)?
            .set("compiler", &info.compiler)?
            .set("platform", &info.platform)?;
        Ok(builder.build())
    }

    /// Fields sit at the top level rather than under a list.
    fn project(objects: &[ServerVersionInfo]) -> ProviderResult<Map<String, Value>> {
        match objects {
            [info] => Self::flatten(info),
            other => Err(ProviderError::Output {
                field: "version".to_string(),
                message: format!("expected one version document, got {}", other.len()),
            }),
        }
    }
}
