//! Context factory: the one place contexts are built and linked.

use crate::confinement::{run_loop, serial_queue, Dispatcher};
use crate::context::merge::MergePolicy;
use crate::context::scope::{Context, ContextLink};
use crate::error::ContextError;
use crate::notification::NotificationCenter;
use crate::store::StoreCoordinator;
use crate::types::ContextId;
use std::sync::Arc;
use tracing::{debug, error};

const MISSING_LINK: &str = "a context needs exactly one of a parent context or a store coordinator";

#[derive(Clone)]
pub struct ContextFactory {
    notifications: Arc<NotificationCenter>,
    child_merge_policy: MergePolicy,
}

impl ContextFactory {
    pub fn new(notifications: Arc<NotificationCenter>) -> Self {
        Self {
            notifications,
            child_merge_policy: MergePolicy::default(),
        }
    }

    /// Merge policy given to parent-linked contexts at creation
    pub fn with_child_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.child_merge_policy = policy;
        self
    }

    pub fn notifications(&self) -> &Arc<NotificationCenter> {
        &self.notifications
    }

    /// Build a context linked to `parent` or attached to `coordinator`.
    ///
    /// Exactly one must be given. A parent-linked context gets a private serial
    /// queue; a coordinator-attached one is confined to the calling thread.
    /// Anything else is a caller bug and yields
    /// [`ContextError::Configuration`] without building a context.
    pub fn create(
        &self,
        parent: Option<&Arc<Context>>,
        coordinator: Option<Arc<dyn StoreCoordinator>>,
    ) -> Result<Arc<Context>, ContextError> {
        let id = ContextId::next();
        match (parent, coordinator) {
            (Some(parent), None) => {
                let queue = serial_queue::spawn(format!("ctxstack.queue.{}", id.as_u64()))?;
                self.build(id, ContextLink::Parent(parent.clone()), queue)
            }
            (None, Some(coordinator)) => {
                coordinator.attach(id)?;
                self.build(id, ContextLink::Store(coordinator), run_loop::current())
            }
            (parent, coordinator) => {
                error!(
                    fatal = true,
                    has_parent = parent.is_some(),
                    has_coordinator = coordinator.is_some(),
                    "{}",
                    MISSING_LINK
                );
                Err(ContextError::Configuration(MISSING_LINK.to_string()))
            }
        }
    }

    pub fn create_attached_to_store(
        &self,
        coordinator: Arc<dyn StoreCoordinator>,
    ) -> Result<Arc<Context>, ContextError> {
        self.create(None, Some(coordinator))
    }

    pub fn create_child(&self, parent: &Arc<Context>) -> Result<Arc<Context>, ContextError> {
        self.create(Some(parent), None)
    }

    /// Child of `parent` confined to the calling thread instead of a private
    /// queue. Suitable as an owner-confined default context.
    pub fn create_child_on_current_thread(
        &self,
        parent: &Arc<Context>,
    ) -> Result<Arc<Context>, ContextError> {
        self.build(
            ContextId::next(),
            ContextLink::Parent(parent.clone()),
            run_loop::current(),
        )
    }

    fn build(
        &self,
        id: ContextId,
        link: ContextLink,
        confinement: Dispatcher,
    ) -> Result<Arc<Context>, ContextError> {
        let policy = match &link {
            ContextLink::Parent(_) => self.child_merge_policy,
            ContextLink::Store(_) => MergePolicy::default(),
        };
        let context = Context::new(id, link, confinement, self.notifications.clone(), policy);
        context.enable_permanent_ids_before_saving();
        debug!(
            context = %context.id(),
            kind = %context.kind(),
            parent = ?context.parent().map(|p| p.id()),
            "Context created"
        );
        Ok(context)
    }
}
