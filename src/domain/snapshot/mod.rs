pub mod flatten;
pub mod identity;
pub mod kind;
pub mod pods;
pub mod record;
pub mod server_version;
pub mod services;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub use identity::IdentityPolicy;
pub use kind::{assemble, capture, SnapshotKind};
pub use pods::PodSnapshot;
pub use record::{SnapshotRecord, SnapshotScope};
pub use server_version::ServerVersionSnapshot;
pub use services::ServiceSnapshot;

use crate::core::client::session::ClusterSession;
use crate::errors::{ProviderError, ProviderResult};

/// Snapshot kinds selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKindName {
    Pods,
    Services,
    ServerVersion,
}

impl SnapshotKindName {
    pub const ALL: [SnapshotKindName; 3] = [Self::Pods, Self::Services, Self::ServerVersion];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pods => PodSnapshot::KIND,
            Self::Services => ServiceSnapshot::KIND,
            Self::ServerVersion => ServerVersionSnapshot::KIND,
        }
    }

    pub fn identity_policy(self) -> IdentityPolicy {
        match self {
            Self::Pods => PodSnapshot::IDENTITY,
            Self::Services => ServiceSnapshot::IDENTITY,
            Self::ServerVersion => ServerVersionSnapshot::IDENTITY,
        }
    }

    pub async fn capture(
        self,
        session: &ClusterSession,
        scope: &SnapshotScope,
        triggers: BTreeMap<String, String>,
    ) -> ProviderResult<SnapshotRecord> {
        match self {
            Self::Pods => capture::<PodSnapshot>(session, scope, triggers).await,
            Self::Services => capture::<ServiceSnapshot>(session, scope, triggers).await,
            Self::ServerVersion => capture::<ServerVersionSnapshot>(session, scope, triggers).await,
        }
    }
}

impl fmt::Display for SnapshotKindName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotKindName {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| ProviderError::Config {
                field: "kind".to_string(),
                message: format!("unknown snapshot kind '{s}'"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cli_spellings() {
        assert_eq!("pods".parse::<SnapshotKindName>().unwrap(), SnapshotKindName::Pods);
        assert_eq!(
            "server-version".parse::<SnapshotKindName>().unwrap(),
            SnapshotKindName::ServerVersion
        );
        assert!("deployments".parse::<SnapshotKindName>().is_err());
    }

    #[test]
    fn only_server_version_is_point_in_time() {
        for kind in SnapshotKindName::ALL {
            let expected = if kind == SnapshotKindName::ServerVersion {
                IdentityPolicy::PointInTime
            } else {
                IdentityPolicy::ContentAddressed
            };
            assert_eq!(kind.identity_policy(), expected, "{kind}");
        }
    }
}
