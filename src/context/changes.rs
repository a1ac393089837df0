//! Change sets, save options and save outcomes.

use crate::notification::SaveEvent;
use crate::store::PersistReceipt;
use crate::types::{Attributes, ContextId, ObjectId, ObjectSnapshot};
use serde::{Deserialize, Serialize};

/// Pending change to one object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectChange {
    pub id: ObjectId,
    pub entity: String,
    /// Properties changed since the object was last committed in this context
    pub changed: Attributes,
    /// Full current values (committed overlaid with changes)
    pub values: Attributes,
    /// Store version the change is based on
    pub base_version: u64,
}

impl ObjectChange {
    pub fn deletion(id: ObjectId, entity: impl Into<String>, base_version: u64) -> Self {
        Self {
            id,
            entity: entity.into(),
            changed: Attributes::new(),
            values: Attributes::new(),
            base_version,
        }
    }

    fn snapshot(&self) -> ObjectSnapshot {
        ObjectSnapshot {
            id: self.id,
            entity: self.entity.clone(),
            attributes: self.values.clone(),
            version: self.base_version,
        }
    }
}

/// Everything one context would commit on save
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub inserted: Vec<ObjectChange>,
    pub updated: Vec<ObjectChange>,
    pub deleted: Vec<ObjectChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.inserted
            .iter()
            .chain(&self.updated)
            .chain(&self.deleted)
            .any(|change| change.id == *id)
    }

    /// Event describing a save into a parent context
    pub(crate) fn to_event(&self, emitter: ContextId, label: &str) -> SaveEvent {
        let mut event = SaveEvent::empty(emitter, label);
        event.inserted = self.inserted.iter().map(ObjectChange::snapshot).collect();
        event.updated = self.updated.iter().map(ObjectChange::snapshot).collect();
        event.deleted = self.deleted.iter().map(|change| change.id).collect();
        event
    }
}

impl PersistReceipt {
    /// Event describing a save into the store
    pub(crate) fn to_event(&self, emitter: ContextId, label: &str) -> SaveEvent {
        let mut event = SaveEvent::empty(emitter, label);
        event.inserted = self.inserted.clone();
        event.updated = self.updated.clone();
        event.deleted = self.deleted.clone();
        event.id_mapping = self.assigned.clone();
        event
    }
}

/// How far and how a save travels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveOptions {
    /// Continue saving each parent after this context
    pub save_parent_contexts: bool,
    /// Block until every parent save has run
    pub synchronously: bool,
}

impl SaveOptions {
    pub fn self_only() -> Self {
        Self::default()
    }

    /// Save up to the store, parents asynchronously
    pub fn to_store() -> Self {
        Self {
            save_parent_contexts: true,
            synchronously: false,
        }
    }

    pub fn to_store_and_wait() -> Self {
        Self {
            save_parent_contexts: true,
            synchronously: true,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SaveOutcome {
    NoChanges,
    Saved(SaveEvent),
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved(_))
    }

    pub fn event(&self) -> Option<&SaveEvent> {
        match self {
            SaveOutcome::Saved(event) => Some(event),
            SaveOutcome::NoChanges => None,
        }
    }
}
