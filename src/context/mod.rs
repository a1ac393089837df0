//! Context domain: confined object graphs, their factory, save and merge.
//!
//! A context commits either into its parent context or, at the top of the
//! chain, into a store coordinator. Cross-context visibility only happens
//! through commit, the save notification, and merge.

pub mod changes;
pub mod factory;
mod graph;
pub mod merge;
pub mod scope;

pub use changes::{ChangeSet, ObjectChange, SaveOptions, SaveOutcome};
pub use factory::ContextFactory;
pub use merge::{MergePolicy, MergeSummary};
pub use scope::{Context, ContextLink, ContextStats};
