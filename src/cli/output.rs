//! CLI output: JSON rendering and error mapping.

use crate::error::{ContextError, StorageError};
use crate::notification::SaveEvent;
use crate::types::ObjectSnapshot;
use serde_json::{json, Map, Value};

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &ContextError) -> String {
    match e {
        ContextError::ObjectNotFound(id) => format!("No object with id {}", id),
        other => other.to_string(),
    }
}

pub(crate) fn snapshot_json(snapshot: &ObjectSnapshot) -> Value {
    let attributes: Map<String, Value> = snapshot
        .attributes
        .iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect();
    json!({
        "id": snapshot.id.to_string(),
        "entity": snapshot.entity,
        "version": snapshot.version,
        "attributes": attributes,
    })
}

pub(crate) fn save_event_json(event: &SaveEvent) -> Value {
    json!({
        "context": event.emitter_label,
        "saved_at": event.saved_at,
        "inserted": event.inserted.iter().map(snapshot_json).collect::<Vec<_>>(),
        "updated": event.updated.iter().map(snapshot_json).collect::<Vec<_>>(),
        "deleted": event.deleted.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
    })
}

pub fn render_json(value: &Value) -> Result<String, ContextError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ContextError::Storage(StorageError::Serialization(e.to_string())))
}
