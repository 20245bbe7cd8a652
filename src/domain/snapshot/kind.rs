use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::info;

use super::identity::IdentityPolicy;
use super::record::{SnapshotRecord, SnapshotScope};
use crate::core::client::session::ClusterSession;
use crate::errors::ProviderResult;

/// A read-only view of one cluster object kind, flattened into a snapshot record.
///
/// `fetch` talks to the cluster; `flatten` and `project` are pure so that a
/// kind's output shape can be checked without a cluster.
#[async_trait]
pub trait SnapshotKind {
    /// Output key and record kind, e.g. `services`.
    const KIND: &'static str;
    const IDENTITY: IdentityPolicy;

    type Object: Send + Sync;

    async fn fetch(session: &ClusterSession, scope: &SnapshotScope) -> ProviderResult<Vec<Self::Object>>;

    fn flatten(object: &Self::Object) -> ProviderResult<Map<String, Value>>;

    /// Lays the flattened objects out as record outputs. Defaults to a list under `KIND`.
    fn project(objects: &[Self::Object]) -> ProviderResult<Map<String, Value>> {
        let items = objects
            .iter()
            .map(|o| Self::flatten(o).map(Value::Object))
            .collect::<ProviderResult<Vec<_>>>()?;
        let mut outputs = Map::new();
        outputs.insert(Self::KIND.to_string(), Value::Array(items));
        Ok(outputs)
    }
}

/// Fetch, flatten and stamp one snapshot.
pub async fn capture<K: SnapshotKind>(
    session: &ClusterSession,
    scope: &SnapshotScope,
    triggers: BTreeMap<String, String>,
) -> ProviderResult<SnapshotRecord> {
    let objects = K::fetch(session, scope).await?;
    let record = assemble::<K>(&objects, triggers, Utc::now())?;
    info!(
        "Captured {} snapshot in namespace '{}' ({} object(s), id {})",
        K::KIND,
        scope.namespace,
        objects.len(),
        record.id
    );
    Ok(record)
}

/// Builds the record from already-fetched objects. Triggers are echoed, never hashed.
pub fn assemble<K: SnapshotKind>(
    objects: &[K::Object],
    triggers: BTreeMap<String, String>,
    captured_at: DateTime<Utc>,
) -> ProviderResult<SnapshotRecord> {
    let outputs = K::project(objects)?;
    let id = K::IDENTITY.identity_for(&outputs, captured_at)?;
    Ok(SnapshotRecord {
        id,
        kind: K::KIND.to_string(),
        identity_policy: K::IDENTITY,
        captured_at,
        triggers,
        outputs,
    })
}
