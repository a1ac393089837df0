//! ctxstack: Confined Persistence-Context Stack
//!
//! A two-level stack of object contexts over a durable store. The root context
//! is attached to a [`store::StoreCoordinator`] and owns persistence; the
//! default context is a child of root that applications edit. Each context is
//! confined to one thread or serial queue, saves flow upward one level at a
//! time, and root saves are merged back into the default context through a
//! [`notification::NotificationCenter`].

pub mod cli;
pub mod config;
pub mod confinement;
pub mod context;
pub mod error;
pub mod logging;
pub mod notification;
pub mod registry;
pub mod store;
pub mod types;

pub use confinement::{ConfinementKind, Dispatcher};
pub use context::{
    Context, ContextFactory, ContextLink, MergePolicy, SaveOptions, SaveOutcome,
};
pub use error::{ContextError, StorageError};
pub use registry::{ContextRegistry, ResetOutcome};
pub use store::{SledStoreCoordinator, StoreCoordinator};
pub use types::{AttributeValue, Attributes, ContextId, ObjectId, ObjectSnapshot};
