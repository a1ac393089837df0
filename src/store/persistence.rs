//! Sled-backed store coordinator

use crate::config::StoreConfig;
use crate::context::{ChangeSet, MergePolicy};
use crate::error::StorageError;
use crate::store::{PersistReceipt, StoreCoordinator, StoredObject};
use crate::types::{ContextId, ObjectId, ObjectSnapshot};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Sled-based implementation of StoreCoordinator
///
/// One record per object, keyed by the big-endian permanent id and encoded
/// with bincode. Permanent ids come from `sled::Db::generate_id`.
pub struct SledStoreCoordinator {
    db: sled::Db,
    description: String,
    attached: Mutex<Vec<ContextId>>,
}

impl SledStoreCoordinator {
    /// Open (or create) a store at the given directory
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        Ok(Self::from_db(db, format!("sled:{}", path.display())))
    }

    /// Open a store from configuration
    pub fn open(config: &StoreConfig) -> Result<Self, StorageError> {
        if config.temporary {
            return Self::temporary();
        }
        let mut sled_config = sled::Config::new().path(&config.path);
        if let Some(ms) = config.flush_every_ms {
            sled_config = sled_config.flush_every_ms(Some(ms));
        }
        let db = sled_config.open()?;
        Ok(Self::from_db(db, format!("sled:{}", config.path.display())))
    }

    /// In-memory store, removed on drop
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self::from_db(db, "sled:temporary".to_string()))
    }

    fn from_db(db: sled::Db, description: String) -> Self {
        Self {
            db,
            description,
            attached: Mutex::new(Vec::new()),
        }
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    /// Every stored object, in key order
    pub fn list_all(&self) -> Result<Vec<ObjectSnapshot>, StorageError> {
        let mut objects = Vec::new();
        for item in self.db.iter() {
            let (_, value) = item?;
            let record: StoredObject = bincode::deserialize(&value)?;
            objects.push(record.snapshot());
        }
        Ok(objects)
    }

    fn load(&self, key: &[u8]) -> Result<Option<StoredObject>, StorageError> {
        match self.db.get(key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn permanent_key(id: &ObjectId) -> Result<[u8; 8], StorageError> {
        id.permanent_key().ok_or(StorageError::UnknownIdentity(*id))
    }
}

impl StoreCoordinator for SledStoreCoordinator {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn attach(&self, context: ContextId) -> Result<(), StorageError> {
        let mut attached = self.attached.lock();
        if !attached.contains(&context) {
            attached.push(context);
        }
        info!(store = %self.description, context = %context, "Context attached to store");
        Ok(())
    }

    fn attached_contexts(&self) -> Vec<ContextId> {
        self.attached.lock().clone()
    }

    fn obtain_permanent_ids(
        &self,
        ids: &[ObjectId],
    ) -> Result<BTreeMap<ObjectId, ObjectId>, StorageError> {
        let mut assigned = BTreeMap::new();
        for id in ids.iter().filter(|id| id.is_temporary()) {
            assigned.insert(*id, ObjectId::Permanent(self.db.generate_id()?));
        }
        Ok(assigned)
    }

    fn fetch(&self, id: &ObjectId) -> Result<Option<ObjectSnapshot>, StorageError> {
        let Some(key) = id.permanent_key() else {
            return Ok(None);
        };
        Ok(self.load(&key)?.map(|record| record.snapshot()))
    }

    fn persist(
        &self,
        changes: &ChangeSet,
        policy: MergePolicy,
    ) -> Result<PersistReceipt, StorageError> {
        let mut batch = sled::Batch::default();
        let mut receipt = PersistReceipt::default();

        for change in &changes.inserted {
            let id = match change.id {
                ObjectId::Temporary(_) => {
                    let permanent = ObjectId::Permanent(self.db.generate_id()?);
                    receipt.assigned.insert(change.id, permanent);
                    permanent
                }
                permanent => permanent,
            };
            let key = Self::permanent_key(&id)?;
            let record = StoredObject {
                id: u64::from_be_bytes(key),
                entity: change.entity.clone(),
                attributes: change.values.clone(),
                version: 1,
            };
            batch.insert(&key[..], bincode::serialize(&record)?);
            receipt.inserted.push(record.snapshot());
        }

        for change in &changes.updated {
            let key = Self::permanent_key(&change.id)?;
            let current = self
                .load(&key)?
                .ok_or(StorageError::UnknownIdentity(change.id))?;

            let attributes = if current.version == change.base_version {
                let mut attributes = current.attributes;
                attributes.extend(change.changed.clone());
                attributes
            } else {
                debug!(
                    object = %change.id,
                    expected = change.base_version,
                    found = current.version,
                    policy = ?policy,
                    "Resolving version conflict"
                );
                match policy {
                    MergePolicy::Error => {
                        return Err(StorageError::Conflict {
                            id: change.id,
                            expected: change.base_version,
                            found: current.version,
                        })
                    }
                    MergePolicy::InMemoryWins => {
                        let mut attributes = current.attributes;
                        attributes.extend(change.changed.clone());
                        attributes
                    }
                    MergePolicy::StoreWins => {
                        let mut attributes = current.attributes;
                        for (key, value) in &change.changed {
                            attributes.entry(key.clone()).or_insert_with(|| value.clone());
                        }
                        attributes
                    }
                    MergePolicy::Overwrite => change.values.clone(),
                }
            };

            let record = StoredObject {
                id: current.id,
                entity: current.entity,
                attributes,
                version: current.version + 1,
            };
            batch.insert(&key[..], bincode::serialize(&record)?);
            receipt.updated.push(record.snapshot());
        }

        for change in &changes.deleted {
            let key = Self::permanent_key(&change.id)?;
            let Some(current) = self.load(&key)? else {
                continue;
            };
            if current.version != change.base_version && policy == MergePolicy::Error {
                return Err(StorageError::Conflict {
                    id: change.id,
                    expected: change.base_version,
                    found: current.version,
                });
            }
            batch.remove(&key[..]);
            receipt.deleted.push(change.id);
        }

        self.db.apply_batch(batch)?;
        debug!(
            store = %self.description,
            inserted = receipt.inserted.len(),
            updated = receipt.updated.len(),
            deleted = receipt.deleted.len(),
            "Persisted change set"
        );
        Ok(receipt)
    }
}
