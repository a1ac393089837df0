//! Notification payloads emitted by contexts.

use crate::types::{ContextId, ObjectId, ObjectSnapshot};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WillSave,
    DidSave,
}

/// What a context committed in one save.
///
/// Snapshots carry the values as committed by the emitter. `id_mapping`
/// lists temporary identities that became permanent during the save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveEvent {
    pub emitter: ContextId,
    pub emitter_label: String,
    pub saved_at: String,
    pub inserted: Vec<ObjectSnapshot>,
    pub updated: Vec<ObjectSnapshot>,
    pub deleted: Vec<ObjectId>,
    #[serde(default)]
    pub id_mapping: BTreeMap<ObjectId, ObjectId>,
}

impl SaveEvent {
    pub fn empty(emitter: ContextId, emitter_label: impl Into<String>) -> Self {
        Self {
            emitter,
            emitter_label: emitter_label.into(),
            saved_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            inserted: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            id_mapping: BTreeMap::new(),
        }
    }

    /// Every object touched by the save, under its final identity
    pub fn changed_ids(&self) -> BTreeSet<ObjectId> {
        self.inserted
            .iter()
            .chain(self.updated.iter())
            .map(|snapshot| snapshot.id)
            .chain(self.deleted.iter().copied())
            .collect()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.changed_ids().contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum ContextNotification {
    WillSave { context: ContextId },
    DidSave(SaveEvent),
}

impl ContextNotification {
    pub fn kind(&self) -> EventKind {
        match self {
            ContextNotification::WillSave { .. } => EventKind::WillSave,
            ContextNotification::DidSave(_) => EventKind::DidSave,
        }
    }

    pub fn save_event(&self) -> Option<&SaveEvent> {
        match self {
            ContextNotification::DidSave(event) => Some(event),
            ContextNotification::WillSave { .. } => None,
        }
    }
}
