//! Context registry: the root and default slots and the wiring between them.
//!
//! The registry is an explicitly owned value, shared as `Arc`. It records the
//! thread that created it as the primary thread; an owner-confined default
//! must live there.

use crate::confinement::{run_loop, Dispatcher};
use crate::context::{Context, ContextFactory, MergePolicy, SaveOptions, SaveOutcome};
use crate::error::ContextError;
use crate::notification::{ContextNotification, EventKind, NotificationCenter, SubscriptionId};
use crate::store::StoreCoordinator;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

pub const ROOT_CONTEXT_LABEL: &str = "Root Saving Context";
pub const DEFAULT_CONTEXT_LABEL: &str = "Default Context";

/// Result of [`ContextRegistry::reset_default`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// No default context registered
    Skipped,
    /// Re-dispatched to the primary thread; nothing reset yet
    Deferred,
    Performed,
}

#[derive(Default)]
struct Slots {
    root: Option<Arc<Context>>,
    default: Option<Arc<Context>>,
    default_subscription: Option<SubscriptionId>,
}

pub struct ContextRegistry {
    factory: ContextFactory,
    primary: Dispatcher,
    slots: Mutex<Slots>,
}

impl ContextRegistry {
    /// New empty registry; the calling thread becomes the primary thread.
    pub fn new() -> Arc<Self> {
        Self::with_factory(ContextFactory::new(Arc::new(NotificationCenter::new())))
    }

    pub fn with_factory(factory: ContextFactory) -> Arc<Self> {
        Arc::new(Self {
            factory,
            primary: run_loop::current(),
            slots: Mutex::new(Slots::default()),
        })
    }

    pub fn factory(&self) -> &ContextFactory {
        &self.factory
    }

    pub fn notifications(&self) -> &Arc<NotificationCenter> {
        self.factory.notifications()
    }

    /// Run loop of the primary thread
    pub fn primary(&self) -> &Dispatcher {
        &self.primary
    }

    pub fn root(&self) -> Option<Arc<Context>> {
        self.slots.lock().root.clone()
    }

    pub fn default_context(&self) -> Option<Arc<Context>> {
        self.slots.lock().default.clone()
    }

    /// Whether default currently listens to root's saves
    pub fn is_propagating(&self) -> bool {
        let slots = self.slots.lock();
        slots
            .default_subscription
            .map(|id| self.notifications().contains(id))
            .unwrap_or(false)
    }

    /// Build a fresh root attached to `coordinator` and a default child of it.
    pub fn initialize_stack(
        &self,
        coordinator: Arc<dyn StoreCoordinator>,
    ) -> Result<(), ContextError> {
        let description = coordinator.describe();
        let root = self.factory.create_attached_to_store(coordinator)?;
        self.set_root(Some(root.clone()));
        let default = self.factory.create_child(&root)?;
        self.set_default(Some(default));
        info!(store = %description, "Context stack initialized");
        Ok(())
    }

    pub fn set_root(&self, context: Option<Arc<Context>>) {
        let mut slots = self.slots.lock();
        if let Some(previous) = slots.root.take() {
            let notifications = self.notifications();
            let removed = notifications.remove_emitter(previous.id())
                + notifications.remove_observer(previous.id());
            debug!(context = %previous.id(), removed, "Tore down root subscriptions");
        }

        if let Some(root) = &context {
            root.set_merge_policy(MergePolicy::InMemoryWins);
            root.set_label(ROOT_CONTEXT_LABEL);
            root.enable_permanent_ids_before_saving();
        }
        info!(
            context = ?context.as_ref().map(|c| c.id()),
            "Root context set to {}",
            describe(&context)
        );
        slots.root = context;
    }

    pub fn set_default(&self, context: Option<Arc<Context>>) {
        let mut slots = self.slots.lock();
        if let Some(previous) = slots.default.take() {
            if let Some(id) = slots.default_subscription.take() {
                self.notifications().unsubscribe(id);
            }
            self.notifications().remove_observer(previous.id());
        }

        if let Some(default) = &context {
            default.set_label(DEFAULT_CONTEXT_LABEL);
            default.enable_permanent_ids_before_saving();
            if let Some(root) = &slots.root {
                slots.default_subscription = Some(self.subscribe_to_root_saves(root, default));
            }
        }
        info!(
            context = ?context.as_ref().map(|c| c.id()),
            propagating = slots.default_subscription.is_some(),
            "Default context set to {}",
            describe(&context)
        );
        slots.default = context;
    }

    fn subscribe_to_root_saves(&self, root: &Arc<Context>, default: &Arc<Context>) -> SubscriptionId {
        let target: Weak<Context> = Arc::downgrade(default);
        self.notifications().subscribe(
            root.id(),
            EventKind::DidSave,
            Some(default.id()),
            default.confinement().clone(),
            Arc::new(move |notification: &ContextNotification| {
                let (Some(context), Some(event)) = (target.upgrade(), notification.save_event())
                else {
                    return;
                };
                if let Err(e) = context.merge_changes_from(event) {
                    error!(context = %context.id(), error = %e, "Merge from root save failed");
                }
            }),
        )
    }

    /// Discard everything pending in the default context.
    ///
    /// The default must be owner-confined to the primary thread; anything else
    /// is a contract violation. Called from another thread, the reset is
    /// re-dispatched to the primary thread and `Deferred` is returned at once.
    pub fn reset_default(self: &Arc<Self>) -> Result<ResetOutcome, ContextError> {
        let Some(default) = self.default_context() else {
            return Ok(ResetOutcome::Skipped);
        };

        let owner = default.confinement();
        if !owner.same_confinement(&self.primary) {
            let message = format!(
                "reset_default requires a default confined to the primary thread, found {}",
                default
            );
            error!(fatal = true, context = %default.id(), "{}", message);
            return Err(ContextError::ContractViolation(message));
        }

        if !self.primary.is_current() {
            let registry = Arc::downgrade(self);
            self.primary.dispatch(move || {
                let Some(registry) = registry.upgrade() else {
                    return;
                };
                if let Err(e) = registry.reset_default() {
                    error!(error = %e, "Deferred default reset failed");
                }
            })?;
            debug!(context = %default.id(), "Default reset deferred to primary thread");
            return Ok(ResetOutcome::Deferred);
        }

        default.reset()?;
        info!(context = %default.id(), "Default context reset");
        Ok(ResetOutcome::Performed)
    }

    /// Empty both slots and remove all of their subscriptions.
    pub fn clean_up(&self) {
        self.set_root(None);
        self.set_default(None);
    }

    /// Run `block` in a fresh private child of root, then save up to the store.
    ///
    /// Blocks until the child has committed into root; the root's own save is
    /// queued on root's confinement.
    pub fn save_with<F>(&self, block: F) -> Result<SaveOutcome, ContextError>
    where
        F: FnOnce(&Arc<Context>) -> Result<(), ContextError> + Send + 'static,
    {
        let root = self.root().ok_or_else(|| {
            ContextError::ContractViolation("save_with requires a root context".to_string())
        })?;
        let local = self.factory.create_child(&root)?;
        local.perform_and_wait(move |ctx| -> Result<SaveOutcome, ContextError> {
            block(ctx)?;
            ctx.save_with_options(SaveOptions::to_store())
        })?
    }
}

impl Drop for ContextRegistry {
    fn drop(&mut self) {
        let slots = self.slots.get_mut();
        if slots.root.is_some() || slots.default.is_some() {
            warn!("Context registry dropped without clean_up");
        }
    }
}

fn describe(context: &Option<Arc<Context>>) -> String {
    context
        .as_ref()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}
