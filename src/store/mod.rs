//! Store coordinator
//!
//! The durable side of the stack. A coordinator persists the change sets the
//! root context commits and hands out permanent identities for new objects.

pub mod persistence;

pub use persistence::SledStoreCoordinator;

use crate::context::{ChangeSet, MergePolicy};
use crate::error::StorageError;
use crate::types::{Attributes, ContextId, ObjectId, ObjectSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Record layout of one persisted object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: u64,
    pub entity: String,
    pub attributes: Attributes,
    pub version: u64,
}

impl StoredObject {
    pub fn snapshot(&self) -> ObjectSnapshot {
        ObjectSnapshot {
            id: ObjectId::Permanent(self.id),
            entity: self.entity.clone(),
            attributes: self.attributes.clone(),
            version: self.version,
        }
    }
}

/// Outcome of a successful persist
#[derive(Debug, Clone, Default)]
pub struct PersistReceipt {
    /// Temporary identities replaced during the persist
    pub assigned: BTreeMap<ObjectId, ObjectId>,
    /// Final stored state of inserted objects
    pub inserted: Vec<ObjectSnapshot>,
    /// Final stored state of updated objects, after conflict resolution
    pub updated: Vec<ObjectSnapshot>,
    pub deleted: Vec<ObjectId>,
}

/// Store coordinator interface
pub trait StoreCoordinator: Send + Sync {
    /// Short description for logs
    fn describe(&self) -> String;

    /// Record that `context` commits directly to this coordinator
    fn attach(&self, context: ContextId) -> Result<(), StorageError>;

    fn attached_contexts(&self) -> Vec<ContextId>;

    /// Assign permanent identities to the temporary ones in `ids`.
    ///
    /// Permanent identities in `ids` are ignored. The returned map only holds
    /// the replaced entries.
    fn obtain_permanent_ids(
        &self,
        ids: &[ObjectId],
    ) -> Result<BTreeMap<ObjectId, ObjectId>, StorageError>;

    fn fetch(&self, id: &ObjectId) -> Result<Option<ObjectSnapshot>, StorageError>;

    /// Durably apply `changes`, resolving version conflicts with `policy`.
    fn persist(
        &self,
        changes: &ChangeSet,
        policy: MergePolicy,
    ) -> Result<PersistReceipt, StorageError>;
}

/// Whether two handles point at the same coordinator instance
pub fn same_coordinator(a: &Arc<dyn StoreCoordinator>, b: &Arc<dyn StoreCoordinator>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
