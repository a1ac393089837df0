//! Merge policies and merging another context's save into a graph.

use crate::context::graph::ObjectGraph;
use crate::notification::SaveEvent;
use crate::types::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Conflict-resolution rule for clashing property values.
///
/// At the store it decides what happens when a change was based on a stale
/// version. When merging a save event it decides whether local pending changes
/// survive incoming values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Stale writes fail with a conflict
    #[default]
    Error,
    /// In-memory property values win over stored ones
    InMemoryWins,
    /// Stored property values win over in-memory ones
    StoreWins,
    /// The in-memory object replaces the stored one wholesale
    Overwrite,
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergePolicy::Error => "error",
            MergePolicy::InMemoryWins => "in_memory_wins",
            MergePolicy::StoreWins => "store_wins",
            MergePolicy::Overwrite => "overwrite",
        };
        f.write_str(name)
    }
}

/// What a merge changed in the receiving context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Every object named by the merged event
    pub changed: BTreeSet<ObjectId>,
    /// Temporary identities rewritten to permanent ones
    pub remapped: usize,
    /// Registered objects whose committed values were refreshed
    pub refreshed: usize,
    /// Newly inserted objects registered clean
    pub registered: usize,
    /// Objects dropped because the emitter deleted them
    pub removed: usize,
}

impl ObjectGraph {
    /// Fold a save made elsewhere into this graph.
    pub(crate) fn merge_event(&mut self, event: &SaveEvent, policy: MergePolicy) -> MergeSummary {
        let mut summary = MergeSummary {
            changed: event.changed_ids(),
            remapped: self.remap(&event.id_mapping),
            ..Default::default()
        };

        for snapshot in event.inserted.iter().chain(&event.updated) {
            match self.objects.get_mut(&snapshot.id) {
                Some(object) => {
                    object.committed = snapshot.attributes.clone();
                    object.version = snapshot.version;
                    if policy == MergePolicy::StoreWins {
                        object
                            .changes
                            .retain(|key, _| !snapshot.attributes.contains_key(key));
                        if object.changes.is_empty() {
                            self.updated.remove(&snapshot.id);
                        }
                    }
                    summary.refreshed += 1;
                }
                None if event.inserted.iter().any(|ins| ins.id == snapshot.id) => {
                    self.register_clean(snapshot.clone());
                    summary.registered += 1;
                }
                None => {}
            }
        }

        for id in &event.deleted {
            if self.objects.remove(id).is_some() {
                self.inserted.remove(id);
                self.updated.remove(id);
                self.deleted.remove(id);
                summary.removed += 1;
            }
        }

        summary
    }
}
