//! In-memory object graph owned by a single context.

use crate::context::changes::{ChangeSet, ObjectChange};
use crate::error::ContextError;
use crate::store::PersistReceipt;
use crate::types::{AttributeValue, Attributes, ObjectId, ObjectSnapshot};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub(crate) struct ManagedObject {
    pub id: ObjectId,
    pub entity: String,
    pub committed: Attributes,
    pub changes: Attributes,
    pub version: u64,
}

impl ManagedObject {
    fn from_snapshot(snapshot: ObjectSnapshot) -> Self {
        Self {
            id: snapshot.id,
            entity: snapshot.entity,
            committed: snapshot.attributes,
            changes: Attributes::new(),
            version: snapshot.version,
        }
    }

    pub fn values(&self) -> Attributes {
        let mut values = self.committed.clone();
        values.extend(self.changes.clone());
        values
    }

    pub fn snapshot(&self) -> ObjectSnapshot {
        ObjectSnapshot {
            id: self.id,
            entity: self.entity.clone(),
            attributes: self.values(),
            version: self.version,
        }
    }

    fn commit(&mut self) {
        let changes = std::mem::take(&mut self.changes);
        self.committed.extend(changes);
    }
}

/// Registered objects plus the insert/update/delete bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct ObjectGraph {
    pub objects: HashMap<ObjectId, ManagedObject>,
    pub inserted: BTreeSet<ObjectId>,
    pub updated: BTreeSet<ObjectId>,
    pub deleted: BTreeSet<ObjectId>,
}

impl ObjectGraph {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_registered(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn is_deleted(&self, id: &ObjectId) -> bool {
        self.deleted.contains(id)
    }

    /// Live view of an object; deleted objects are hidden
    pub fn snapshot(&self, id: &ObjectId) -> Option<ObjectSnapshot> {
        if self.is_deleted(id) {
            return None;
        }
        self.objects.get(id).map(ManagedObject::snapshot)
    }

    pub fn has_changes(&self) -> bool {
        !(self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty())
    }

    pub fn register_clean(&mut self, snapshot: ObjectSnapshot) {
        self.objects
            .insert(snapshot.id, ManagedObject::from_snapshot(snapshot));
    }

    pub fn insert_new(&mut self, id: ObjectId, entity: &str, values: Attributes) {
        self.objects.insert(
            id,
            ManagedObject {
                id,
                entity: entity.to_string(),
                committed: Attributes::new(),
                changes: values,
                version: 0,
            },
        );
        self.deleted.remove(&id);
        self.inserted.insert(id);
    }

    /// Record a property change. Returns false if the object is unknown.
    pub fn set_value(&mut self, id: &ObjectId, key: String, value: AttributeValue) -> bool {
        if self.is_deleted(id) {
            return false;
        }
        let Some(object) = self.objects.get_mut(id) else {
            return false;
        };
        object.changes.insert(key, value);
        if !self.inserted.contains(id) {
            self.updated.insert(*id);
        }
        true
    }

    /// Mark an object deleted. Unsaved inserts simply disappear.
    pub fn delete(&mut self, id: &ObjectId) -> bool {
        if !self.objects.contains_key(id) || self.is_deleted(id) {
            return false;
        }
        if self.inserted.remove(id) {
            self.objects.remove(id);
        } else {
            self.updated.remove(id);
            self.deleted.insert(*id);
        }
        true
    }

    fn forget(&mut self, id: &ObjectId) -> bool {
        self.inserted.remove(id);
        self.updated.remove(id);
        self.deleted.remove(id);
        self.objects.remove(id).is_some()
    }

    pub fn temporary_inserts(&self) -> Vec<ObjectId> {
        self.inserted
            .iter()
            .filter(|id| id.is_temporary())
            .copied()
            .collect()
    }

    pub fn pending_changes(&self) -> ChangeSet {
        let change_for = |id: &ObjectId, changed: Attributes| {
            self.objects.get(id).map(|object| ObjectChange {
                id: *id,
                entity: object.entity.clone(),
                changed,
                values: object.values(),
                base_version: object.version,
            })
        };

        ChangeSet {
            inserted: self
                .inserted
                .iter()
                .filter_map(|id| {
                    let values = self.objects.get(id)?.values();
                    change_for(id, values)
                })
                .collect(),
            updated: self
                .updated
                .iter()
                .filter_map(|id| change_for(id, self.objects.get(id)?.changes.clone()))
                .collect(),
            deleted: self
                .deleted
                .iter()
                .filter_map(|id| {
                    let object = self.objects.get(id)?;
                    Some(ObjectChange::deletion(*id, object.entity.clone(), object.version))
                })
                .collect(),
        }
    }

    /// Rename objects whose temporary identity became permanent.
    pub fn remap(&mut self, mapping: &BTreeMap<ObjectId, ObjectId>) -> usize {
        let mut remapped = 0;
        for (from, to) in mapping {
            let Some(mut object) = self.objects.remove(from) else {
                continue;
            };
            object.id = *to;
            self.objects.insert(*to, object);
            for set in [&mut self.inserted, &mut self.updated, &mut self.deleted] {
                if set.remove(from) {
                    set.insert(*to);
                }
            }
            remapped += 1;
        }
        remapped
    }

    /// After handing changes to a parent: everything pending becomes committed.
    pub fn commit_local(&mut self) {
        for id in std::mem::take(&mut self.deleted) {
            self.objects.remove(&id);
        }
        for object in self.objects.values_mut() {
            object.commit();
        }
        self.inserted.clear();
        self.updated.clear();
    }

    /// After the store accepted a persist: adopt its identities and versions.
    pub fn apply_receipt(&mut self, receipt: &PersistReceipt) {
        self.remap(&receipt.assigned);
        for id in &receipt.deleted {
            self.forget(id);
        }
        for snapshot in receipt.inserted.iter().chain(&receipt.updated) {
            self.register_clean(snapshot.clone());
        }
        for id in std::mem::take(&mut self.deleted) {
            self.objects.remove(&id);
        }
        self.inserted.clear();
        self.updated.clear();
    }

    /// Take in a child's committed changes as pending changes of this graph.
    ///
    /// `fault` loads objects this graph has not registered yet. Every update
    /// target is resolved before anything is applied; on error the graph is
    /// left untouched.
    pub fn absorb<F>(&mut self, changes: &ChangeSet, mut fault: F) -> Result<(), ContextError>
    where
        F: FnMut(&ObjectId) -> Result<Option<ObjectSnapshot>, ContextError>,
    {
        let mut faulted = Vec::new();
        for change in &changes.updated {
            if self.is_deleted(&change.id) {
                return Err(ContextError::ObjectNotFound(change.id));
            }
            if !self.is_registered(&change.id) {
                let snapshot = fault(&change.id)?.ok_or(ContextError::ObjectNotFound(change.id))?;
                faulted.push(snapshot);
            }
        }
        for change in &changes.deleted {
            if !self.is_registered(&change.id) {
                if let Some(snapshot) = fault(&change.id)? {
                    faulted.push(snapshot);
                }
            }
        }

        for snapshot in faulted {
            self.register_clean(snapshot);
        }
        for change in &changes.inserted {
            self.insert_new(change.id, &change.entity, change.values.clone());
        }
        for change in &changes.updated {
            for (key, value) in &change.changed {
                self.set_value(&change.id, key.clone(), value.clone());
            }
        }
        for change in &changes.deleted {
            self.delete(&change.id);
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.objects.clear();
        self.inserted.clear();
        self.updated.clear();
        self.deleted.clear();
    }
}
