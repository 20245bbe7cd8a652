//! Shared projection helpers for snapshot kinds.
//!
//! Every field goes through [`RecordBuilder::set`]; a value that fails to
//! serialize aborts the capture instead of leaving a hole in the record.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::client::kube_resources::ObjectMeta;
use crate::errors::{ProviderError, ProviderResult};

#[derive(Debug, Default)]
pub struct RecordBuilder {
    fields: Map<String, Value>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Serialize + ?Sized>(&mut self, field: &str, value: &T) -> ProviderResult<&mut Self> {
        let value = serde_json::to_value(value).map_err(|e| ProviderError::Output {
            field: field.to_string(),
            message: e.to_string(),
        })?;
        self.fields.insert(field.to_string(), value);
        Ok(self)
    }

    pub fn build(self) -> Map<String, Value> {
        self.fields
    }
}

/// Fields every object kind reports: identity, labels and a status summary.
pub fn common_fields<S: Serialize>(
    builder: &mut RecordBuilder,
    kind: &str,
    meta: &ObjectMeta,
    status: Option<&S>,
) -> ProviderResult<()> {
    builder
        .set("kind", kind)?
        .set("name", &meta.name.clone().unwrap_or_default())?
        .set("namespace", &meta.namespace.clone().unwrap_or_default())?
        .set("status", &status_summary(status)?)?
        .set("labels", &meta.labels.clone().unwrap_or_default())?
        .set("annotations", &meta.annotations.clone().unwrap_or_default())?
        .set("generate_name", &meta.generate_name.clone().unwrap_or_default())?
        .set("resource_version", &meta.resource_version.clone().unwrap_or_default())?
        .set("uid", &meta.uid.clone().unwrap_or_default())?;
    Ok(())
}

/// Compact JSON rendering of an object's status block, empty when absent.
pub fn status_summary<S: Serialize>(status: Option<&S>) -> ProviderResult<String> {
    match status {
        None => Ok(String::new()),
        Some(s) => serde_json::to_string(s).map_err(|e| ProviderError::Output {
            field: "status".to_string(),
            message: e.to_string(),
        }),
    }
}
