//! The confined persistence context.

use crate::confinement::{ConfinementKind, Dispatcher};
use crate::context::changes::{ChangeSet, SaveOptions, SaveOutcome};
use crate::context::graph::ObjectGraph;
use crate::context::merge::{MergePolicy, MergeSummary};
use crate::error::ContextError;
use crate::notification::{ContextNotification, NotificationCenter, SaveEvent};
use crate::store::StoreCoordinator;
use crate::types::{AttributeValue, Attributes, ContextId, ObjectId, ObjectSnapshot};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error};

/// Where a context's commits go
#[derive(Clone)]
pub enum ContextLink {
    Parent(Arc<Context>),
    Store(Arc<dyn StoreCoordinator>),
}

/// Lifetime counters for one context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    pub saves: u64,
    pub merges: u64,
    pub resets: u64,
}

#[derive(Default)]
struct StatsCounters {
    saves: AtomicU64,
    merges: AtomicU64,
    resets: AtomicU64,
}

/// A confined, mutable scope of pending object changes.
///
/// Every operation that touches the object graph must run on the context's
/// confinement; use [`perform`](Context::perform) or
/// [`perform_and_wait`](Context::perform_and_wait) to get there. Off-confinement
/// calls fail with [`ContextError::ConfinementViolation`].
pub struct Context {
    id: ContextId,
    confinement: Dispatcher,
    link: ContextLink,
    notifications: Arc<NotificationCenter>,
    label: RwLock<String>,
    merge_policy: RwLock<MergePolicy>,
    obtains_permanent_ids: AtomicBool,
    graph: Mutex<ObjectGraph>,
    stats: StatsCounters,
    last_merge: Mutex<Option<MergeSummary>>,
}

impl Context {
    pub(crate) fn new(
        id: ContextId,
        link: ContextLink,
        confinement: Dispatcher,
        notifications: Arc<NotificationCenter>,
        merge_policy: MergePolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            confinement,
            link,
            notifications,
            label: RwLock::new(id.to_string()),
            merge_policy: RwLock::new(merge_policy),
            obtains_permanent_ids: AtomicBool::new(false),
            graph: Mutex::new(ObjectGraph::default()),
            stats: StatsCounters::default(),
            last_merge: Mutex::new(None),
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn label(&self) -> String {
        self.label.read().clone()
    }

    pub fn set_label(&self, label: impl Into<String>) {
        *self.label.write() = label.into();
    }

    pub fn merge_policy(&self) -> MergePolicy {
        *self.merge_policy.read()
    }

    pub fn set_merge_policy(&self, policy: MergePolicy) {
        *self.merge_policy.write() = policy;
    }

    pub fn confinement(&self) -> &Dispatcher {
        &self.confinement
    }

    pub fn kind(&self) -> ConfinementKind {
        self.confinement.kind()
    }

    pub fn link(&self) -> &ContextLink {
        &self.link
    }

    pub fn parent(&self) -> Option<&Arc<Context>> {
        match &self.link {
            ContextLink::Parent(parent) => Some(parent),
            ContextLink::Store(_) => None,
        }
    }

    /// The coordinator this context is attached to directly, if any
    pub fn store(&self) -> Option<&Arc<dyn StoreCoordinator>> {
        match &self.link {
            ContextLink::Store(store) => Some(store),
            ContextLink::Parent(_) => None,
        }
    }

    /// The coordinator at the top of the parent chain
    pub fn coordinator(&self) -> Arc<dyn StoreCoordinator> {
        match &self.link {
            ContextLink::Store(store) => store.clone(),
            ContextLink::Parent(parent) => parent.coordinator(),
        }
    }

    pub fn obtains_permanent_ids_before_saving(&self) -> bool {
        self.obtains_permanent_ids.load(Ordering::SeqCst)
    }

    /// Assign permanent identities to inserted objects before every save.
    /// Returns false if it was already enabled.
    pub fn enable_permanent_ids_before_saving(&self) -> bool {
        !self.obtains_permanent_ids.swap(true, Ordering::SeqCst)
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            saves: self.stats.saves.load(Ordering::SeqCst),
            merges: self.stats.merges.load(Ordering::SeqCst),
            resets: self.stats.resets.load(Ordering::SeqCst),
        }
    }

    /// Summary of the most recent merge from another context's save
    pub fn last_merge(&self) -> Option<MergeSummary> {
        self.last_merge.lock().clone()
    }

    pub fn is_on_confinement(&self) -> bool {
        self.confinement.is_current()
    }

    fn assert_confined(&self) -> Result<(), ContextError> {
        if self.is_on_confinement() {
            return Ok(());
        }
        Err(ContextError::ConfinementViolation {
            context: self.id,
            expected: self.confinement.thread_id(),
            actual: std::thread::current().id(),
        })
    }

    /// Run `job` on this context's confinement without waiting.
    pub fn perform<F>(self: &Arc<Self>, job: F) -> Result<(), ContextError>
    where
        F: FnOnce(&Arc<Context>) + Send + 'static,
    {
        let context = self.clone();
        self.confinement.dispatch(move || job(&context))
    }

    /// Run `job` on this context's confinement and wait for its result.
    ///
    /// Runs inline when already on the confinement. Otherwise blocks until the
    /// confinement services the job; for owner-thread contexts that means the
    /// owner must be draining its run loop.
    ///
    /// Must not be called from async context: the blocking wait panics inside
    /// a tokio runtime. Use [`perform`](Context::perform) there instead.
    pub fn perform_and_wait<F, R>(self: &Arc<Self>, job: F) -> Result<R, ContextError>
    where
        F: FnOnce(&Arc<Context>) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_on_confinement() {
            return Ok(job(self));
        }
        let (tx, rx) = oneshot::channel();
        let context = self.clone();
        self.confinement.dispatch(move || {
            let _ = tx.send(job(&context));
        })?;
        rx.blocking_recv()
            .map_err(|_| ContextError::ConfinementClosed(self.confinement.label().to_string()))
    }

    fn fault(&self, id: &ObjectId) -> Result<Option<ObjectSnapshot>, ContextError> {
        match &self.link {
            ContextLink::Parent(parent) => parent.snapshot_for_child(id),
            ContextLink::Store(store) => Ok(store.fetch(id)?),
        }
    }

    /// Current values of `id` as a child would see them. Copies, never shares.
    pub(crate) fn snapshot_for_child(
        &self,
        id: &ObjectId,
    ) -> Result<Option<ObjectSnapshot>, ContextError> {
        {
            let graph = self.graph.lock();
            if graph.is_registered(id) {
                return Ok(graph.snapshot(id));
            }
        }
        self.fault(id)
    }

    /// Register `id` if it is not known yet. Returns false if it does not exist.
    fn ensure_registered(&self, graph: &mut ObjectGraph, id: &ObjectId) -> Result<bool, ContextError> {
        if graph.is_registered(id) {
            return Ok(!graph.is_deleted(id));
        }
        match self.fault(id)? {
            Some(snapshot) => {
                graph.register_clean(snapshot);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn insert_object(
        &self,
        entity: &str,
        attributes: Attributes,
    ) -> Result<ObjectId, ContextError> {
        self.assert_confined()?;
        let id = ObjectId::temporary();
        self.graph.lock().insert_new(id, entity, attributes);
        Ok(id)
    }

    pub fn set_value(
        &self,
        id: &ObjectId,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Result<(), ContextError> {
        self.assert_confined()?;
        let mut graph = self.graph.lock();
        if !self.ensure_registered(&mut graph, id)? {
            return Err(ContextError::ObjectNotFound(*id));
        }
        graph.set_value(id, key.into(), value.into());
        Ok(())
    }

    pub fn delete_object(&self, id: &ObjectId) -> Result<(), ContextError> {
        self.assert_confined()?;
        let mut graph = self.graph.lock();
        if !self.ensure_registered(&mut graph, id)? {
            return Err(ContextError::ObjectNotFound(*id));
        }
        graph.delete(id);
        Ok(())
    }

    /// Current values of `id`, faulting it in from the parent or store
    pub fn object(&self, id: &ObjectId) -> Result<Option<ObjectSnapshot>, ContextError> {
        self.assert_confined()?;
        let mut graph = self.graph.lock();
        if !self.ensure_registered(&mut graph, id)? {
            return Ok(None);
        }
        Ok(graph.snapshot(id))
    }

    /// Number of objects cached in this context
    pub fn registered_count(&self) -> Result<usize, ContextError> {
        self.assert_confined()?;
        Ok(self.graph.lock().len())
    }

    pub fn has_changes(&self) -> Result<bool, ContextError> {
        self.assert_confined()?;
        Ok(self.graph.lock().has_changes())
    }

    pub fn pending_changes(&self) -> Result<ChangeSet, ContextError> {
        self.assert_confined()?;
        Ok(self.graph.lock().pending_changes())
    }

    /// Replace temporary identities of inserted objects with permanent ones.
    pub fn obtain_permanent_ids(&self) -> Result<usize, ContextError> {
        self.assert_confined()?;
        let temporary = self.graph.lock().temporary_inserts();
        if temporary.is_empty() {
            return Ok(0);
        }
        let mapping = self.coordinator().obtain_permanent_ids(&temporary)?;
        let remapped = self.graph.lock().remap(&mapping);
        debug!(context = %self.id, remapped, "Obtained permanent identities");
        Ok(remapped)
    }

    /// Commit pending changes one level: into the parent, or into the store.
    pub fn save(&self) -> Result<SaveOutcome, ContextError> {
        self.assert_confined()?;
        if !self.graph.lock().has_changes() {
            return Ok(SaveOutcome::NoChanges);
        }

        self.notifications
            .post(self.id, ContextNotification::WillSave { context: self.id });
        if self.obtains_permanent_ids_before_saving() {
            self.obtain_permanent_ids()?;
        }

        let label = self.label();
        // Held until the bookkeeping is cleared: a child committing into this
        // graph meanwhile waits instead of having its changes cleared unsaved.
        let event = {
            let mut graph = self.graph.lock();
            let changes = graph.pending_changes();
            match &self.link {
                ContextLink::Parent(parent) => {
                    parent.absorb_child_changes(&changes)?;
                    graph.commit_local();
                    changes.to_event(self.id, &label)
                }
                ContextLink::Store(store) => {
                    let receipt = store.persist(&changes, self.merge_policy())?;
                    graph.apply_receipt(&receipt);
                    receipt.to_event(self.id, &label)
                }
            }
        };

        self.stats.saves.fetch_add(1, Ordering::SeqCst);
        debug!(
            context = %self.id,
            label = %label,
            inserted = event.inserted.len(),
            updated = event.updated.len(),
            deleted = event.deleted.len(),
            "Context saved"
        );
        self.notifications
            .post(self.id, ContextNotification::DidSave(event.clone()));
        Ok(SaveOutcome::Saved(event))
    }

    /// Save, then schedule each parent's save up to the store.
    pub fn save_to_store(self: &Arc<Self>) -> Result<SaveOutcome, ContextError> {
        self.save_with_options(SaveOptions::to_store())
    }

    pub fn save_with_options(
        self: &Arc<Self>,
        options: SaveOptions,
    ) -> Result<SaveOutcome, ContextError> {
        let outcome = self.save()?;
        if !options.save_parent_contexts || !outcome.is_saved() {
            return Ok(outcome);
        }
        let Some(parent) = self.parent() else {
            return Ok(outcome);
        };

        if options.synchronously {
            parent.perform_and_wait(move |parent| parent.save_with_options(options))??;
        } else {
            parent.perform(move |parent| {
                if let Err(e) = parent.save_with_options(options) {
                    error!(context = %parent.id(), error = %e, "Parent save failed");
                }
            })?;
        }
        Ok(outcome)
    }

    /// Drop every pending change and cached object.
    pub fn reset(&self) -> Result<(), ContextError> {
        self.assert_confined()?;
        self.graph.lock().reset();
        self.stats.resets.fetch_add(1, Ordering::SeqCst);
        debug!(context = %self.id, "Context reset");
        Ok(())
    }

    /// Fold another context's save into this one.
    pub fn merge_changes_from(&self, event: &SaveEvent) -> Result<MergeSummary, ContextError> {
        self.assert_confined()?;
        let summary = self.graph.lock().merge_event(event, self.merge_policy());
        self.stats.merges.fetch_add(1, Ordering::SeqCst);
        debug!(
            context = %self.id,
            emitter = %event.emitter,
            changed = summary.changed.len(),
            remapped = summary.remapped,
            "Merged changes from save"
        );
        *self.last_merge.lock() = Some(summary.clone());
        Ok(summary)
    }

    /// Take a child's committed changes. Runs on the child's confinement;
    /// the graph lock is the hand-off point. Blocks while this context is in
    /// the middle of its own save. Locks are only ever taken child first, then
    /// parent.
    pub(crate) fn absorb_child_changes(&self, changes: &ChangeSet) -> Result<(), ContextError> {
        let mut graph = self.graph.lock();
        graph.absorb(changes, |id| self.fault(id))
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.label(), self.id, self.kind())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let link = match &self.link {
            ContextLink::Parent(parent) => format!("parent:{}", parent.id()),
            ContextLink::Store(store) => format!("store:{}", store.describe()),
        };
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("label", &self.label())
            .field("kind", &self.kind())
            .field("link", &link)
            .field("merge_policy", &self.merge_policy())
            .finish()
    }
}
