//! Store entries.

use crate::entity::{Delta, EntityId, SharedInfo};

/// Cached state of one entity.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    pub(crate) info: SharedInfo,
    pub(crate) creation_revno: u64,
    pub(crate) revno: u64,
    pub(crate) ref_count: usize,
    pub(crate) removed: bool,
}

impl StoreEntry {
    pub(crate) fn new(info: SharedInfo, revno: u64) -> Self {
        Self {
            info,
            creation_revno: revno,
            revno,
            ref_count: 0,
            removed: false,
        }
    }

    /// Latest snapshot of the entity.
    pub fn info(&self) -> &SharedInfo {
        &self.info
    }

    /// Revision at which the entry was first inserted.
    pub fn creation_revno(&self) -> u64 {
        self.creation_revno
    }

    /// Revision of the latest mutation.
    pub fn revno(&self) -> u64 {
        self.revno
    }

    /// Number of watchers that have been shown this entity and not its removal.
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    /// Whether the entry is a tombstone.
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub(crate) fn to_delta(&self, id: &EntityId) -> Delta {
        Delta {
            id: id.clone(),
            revno: self.revno,
            removed: self.removed,
            info: self.info.clone(),
        }
    }
}

/// Outcome of a store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// A new entry was inserted.
    Added,
    /// An existing entry got new info or was revived.
    Updated,
    /// The entry became a tombstone because watchers still reference it.
    Tombstoned,
    /// The entry was deleted outright.
    Deleted,
    /// Nothing changed and the revision counter did not move.
    Unchanged,
}

impl Mutation {
    /// Whether the mutation advanced the revision counter.
    pub fn is_change(self) -> bool {
        !matches!(self, Mutation::Unchanged)
    }
}
