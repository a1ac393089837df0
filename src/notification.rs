//! Save-propagation channel.
//!
//! A subscription table keyed by `(emitting context, event kind)`. Every
//! subscription names the confinement its handler must run on; posting sends
//! the handler to that confinement instead of calling it inline.

pub mod events;

pub use events::{ContextNotification, EventKind, SaveEvent};

use crate::confinement::Dispatcher;
use crate::types::ContextId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Notification handler; runs on the subscription's target confinement.
pub type Handler = Arc<dyn Fn(&ContextNotification) + Send + Sync>;

/// Token returned by [`NotificationCenter::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        SubscriptionId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

struct Subscription {
    id: SubscriptionId,
    observer: Option<ContextId>,
    target: Dispatcher,
    handler: Handler,
}

#[derive(Default)]
pub struct NotificationCenter {
    table: RwLock<HashMap<(ContextId, EventKind), Vec<Subscription>>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind` events emitted by `emitter`.
    ///
    /// `observer` names the context the subscription belongs to, so it can be
    /// torn down with [`remove_observer`](Self::remove_observer).
    pub fn subscribe(
        &self,
        emitter: ContextId,
        kind: EventKind,
        observer: Option<ContextId>,
        target: Dispatcher,
        handler: Handler,
    ) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.table
            .write()
            .entry((emitter, kind))
            .or_default()
            .push(Subscription {
                id,
                observer,
                target,
                handler,
            });
        debug!(
            subscription = id.0,
            emitter = %emitter,
            kind = ?kind,
            observer = ?observer,
            "Subscription registered"
        );
        id
    }

    /// Remove one subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut table = self.table.write();
        let mut removed = false;
        table.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|sub| sub.id != id);
            removed |= subs.len() != before;
            !subs.is_empty()
        });
        removed
    }

    /// Remove every subscription owned by `observer`
    pub fn remove_observer(&self, observer: ContextId) -> usize {
        let mut table = self.table.write();
        let mut removed = 0;
        table.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|sub| sub.observer != Some(observer));
            removed += before - subs.len();
            !subs.is_empty()
        });
        if removed > 0 {
            debug!(observer = %observer, removed, "Observer subscriptions removed");
        }
        removed
    }

    /// Remove every subscription listening to events from `emitter`
    pub fn remove_emitter(&self, emitter: ContextId) -> usize {
        let mut table = self.table.write();
        let mut removed = 0;
        table.retain(|(source, _), subs| {
            if *source == emitter {
                removed += subs.len();
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(emitter = %emitter, removed, "Emitter subscriptions removed");
        }
        removed
    }

    /// Deliver `notification` from `emitter` to every matching subscription.
    ///
    /// Each handler is dispatched to its target confinement. Returns how many
    /// handlers were dispatched.
    pub fn post(&self, emitter: ContextId, notification: ContextNotification) -> usize {
        let kind = notification.kind();
        let targets: Vec<(SubscriptionId, Dispatcher, Handler)> = {
            let table = self.table.read();
            match table.get(&(emitter, kind)) {
                Some(subs) => subs
                    .iter()
                    .map(|sub| (sub.id, sub.target.clone(), sub.handler.clone()))
                    .collect(),
                None => return 0,
            }
        };

        let notification = Arc::new(notification);
        let mut delivered = 0;
        for (id, target, handler) in targets {
            let payload = notification.clone();
            match target.dispatch(move || handler(payload.as_ref())) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(subscription = id.0, error = %e, "Dropped notification"),
            }
        }
        delivered
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.table.read().values().map(Vec::len).sum()
    }

    /// Number of live subscriptions listening to `emitter`
    pub fn subscriptions_for(&self, emitter: ContextId) -> usize {
        self.table
            .read()
            .iter()
            .filter(|((source, _), _)| *source == emitter)
            .map(|(_, subs)| subs.len())
            .sum()
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.table
            .read()
            .values()
            .any(|subs| subs.iter().any(|sub| sub.id == id))
    }
}
