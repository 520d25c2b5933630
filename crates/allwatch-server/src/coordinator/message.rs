//! Messages exchanged with the coordinator task.

use tokio::sync::oneshot;

use allwatch_core::{Delta, EntityId, StoreEntry};

use crate::error::Result;

/// Reply slot for a delta batch.
pub(crate) type BatchReply = oneshot::Sender<Result<Vec<Delta>>>;

/// Requests from handles and watchers.
#[derive(Debug)]
pub(crate) enum Request {
    /// Register a new watcher starting at revision 0.
    Subscribe { watcher_id: u64 },
    /// Ask for the next batch of deltas.
    Next { watcher_id: u64, reply: BatchReply },
    /// Forget a watcher and release everything it observed.
    Stop { watcher_id: u64 },
    /// Report coordinator statistics.
    Stats {
        reply: oneshot::Sender<Result<CoordinatorStats>>,
    },
    /// Report the store state of one entity.
    Inspect {
        id: EntityId,
        reply: oneshot::Sender<Result<Option<EntrySnapshot>>>,
    },
}

/// Messages on the change channel.
#[derive(Debug)]
pub(crate) enum ChangeMessage {
    /// An entity may have changed.
    Changed(EntityId),
    /// Acknowledge once every earlier change has been applied.
    Barrier(oneshot::Sender<()>),
}

/// Point-in-time statistics of the coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Latest store revision.
    pub latest_revno: u64,
    /// Store entries, tombstones included.
    pub entries: usize,
    /// Tombstones awaiting release.
    pub tombstones: usize,
    /// Registered watchers.
    pub watchers: usize,
    /// Outstanding `next` requests across all watchers.
    pub pending_requests: usize,
}

/// Store state of a single entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySnapshot {
    /// Revision at which the entity was first stored.
    pub creation_revno: u64,
    /// Revision of the latest mutation.
    pub revno: u64,
    /// Watchers holding a reference.
    pub ref_count: usize,
    /// Whether the entry is a tombstone.
    pub removed: bool,
}

impl From<&StoreEntry> for EntrySnapshot {
    fn from(entry: &StoreEntry) -> Self {
        Self {
            creation_revno: entry.creation_revno(),
            revno: entry.revno(),
            ref_count: entry.ref_count(),
            removed: entry.is_removed(),
        }
    }
}
