//! Identifier-keyed reconciliation between the displayed set and a snapshot.
//!
//! The reconciler answers one question: given the ids currently on screen and
//! a fresh snapshot, which entities are new, which are still present, and
//! which ids went away? It never looks at positions; whether an update is a
//! no-op is the sink's decision.
//!
//! ```text
//! previous = {A, B}      next = {B, C}
//!
//!   added   = {C}        (in next only)
//!   updated = {B}        (in both)
//!   removed = {A}        (in previous only)
//! ```
//!
//! Runs in O(|previous| + |next|) using hash lookups.

use std::collections::HashSet;

use crate::entity::{Entity, EntityId, Snapshot};

/// The changes needed to bring the displayed set in line with a snapshot.
#[derive(Debug, Default)]
pub struct Delta<'a> {
    /// Entities whose id is new.
    pub added: Vec<&'a Entity>,
    /// Entities already displayed, always reported even if unmoved.
    pub updated: Vec<&'a Entity>,
    /// Displayed ids absent from the snapshot, sorted.
    pub removed: Vec<EntityId>,
}

impl Delta<'_> {
    /// Whether the set of ids changes (ignoring position updates).
    pub fn changes_membership(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    /// Ids that will be displayed once the delta is applied.
    pub fn next_ids(&self) -> HashSet<EntityId> {
        self.added
            .iter()
            .chain(self.updated.iter())
            .map(|e| e.id.clone())
            .collect()
    }
}

/// Compute the delta between `previous` ids and the `next` snapshot.
///
/// Duplicate ids in `next` collapse to their last occurrence.
pub fn diff<'a>(previous: &HashSet<EntityId>, next: &'a Snapshot) -> Delta<'a> {
    let unique = next.unique_entities();
    let mut seen: HashSet<&str> = HashSet::with_capacity(unique.len());
    let mut delta = Delta::default();

    for entity in unique {
        seen.insert(entity.id.as_str());
        if previous.contains(&entity.id) {
            delta.updated.push(entity);
        } else {
            delta.added.push(entity);
        }
    }

    delta.removed = previous
        .iter()
        .filter(|id| !seen.contains(id.as_str()))
        .cloned()
        .collect();
    delta.removed.sort();

    delta
}
