use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::errors::{ProviderError, ProviderResult};

/// How a snapshot kind derives its identity. Chosen once per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPolicy {
    /// Hex SHA-256 of the serialized outputs: unchanged cluster state, unchanged id.
    ContentAddressed,
    /// Unix seconds of the capture: every capture is new.
    PointInTime,
}

impl IdentityPolicy {
    pub fn identity_for(self, outputs: &Map<String, Value>, captured_at: DateTime<Utc>) -> ProviderResult<String> {
        match self {
            IdentityPolicy::ContentAddressed => content_digest(outputs),
            IdentityPolicy::PointInTime => Ok(captured_at.timestamp().to_string()),
        }
    }
}

/// Keys sorted at every depth, whatever map ordering serde_json was built with.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Value::Object(keys.into_iter().map(|k| (k.clone(), canonical(&map[k]))).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

pub fn content_digest(outputs: &Map<String, Value>) -> ProviderResult<String> {
    let canonical = canonical(&Value::Object(outputs.clone()));
    let bytes = serde_json::to_vec(&canonical).map_err(|e| ProviderError::Output {
        field: "id".to_string(),
        message: e.to_string(),
    })?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
