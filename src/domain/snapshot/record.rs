use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::identity::IdentityPolicy;

pub const DEFAULT_NAMESPACE: &str = "default";

/// Where a capture looks for objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotScope {
    pub namespace: String,
}

impl Default for SnapshotScope {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl SnapshotScope {
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

/// Flattened, identity-bearing result of one capture. Never mutated after assembly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRecord {
    pub id: String,
    pub kind: String,
    pub identity_policy: IdentityPolicy,
    pub captured_at: DateTime<Utc>,
    /// Opaque caller input, compared between invocations to force a new capture.
    pub triggers: BTreeMap<String, String>,
    pub outputs: Map<String, Value>,
}

impl SnapshotRecord {
    /// Records behind a named list output, empty when the key is absent.
    pub fn items(&self, key: &str) -> &[Value] {
        self.outputs
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// True when the caller's triggers differ from the ones this record was captured with.
    pub fn needs_recapture(&self, triggers: &BTreeMap<String, String>) -> bool {
        self.triggers != *triggers
    }
}
