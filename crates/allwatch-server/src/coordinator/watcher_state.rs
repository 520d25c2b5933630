//! Per-watcher bookkeeping held by the coordinator.

use std::collections::{HashSet, VecDeque};

use allwatch_core::EntityId;

use super::message::BatchReply;

/// What the coordinator knows about one watcher.
#[derive(Debug, Default)]
pub(crate) struct WatcherState {
    /// Highest revision already covered by a delivered batch.
    pub last_revno: u64,
    /// Entities the watcher has been shown and not yet seen removed.
    pub observed: HashSet<EntityId>,
    /// Outstanding `next` requests, oldest first.
    pub pending: VecDeque<BatchReply>,
}

impl WatcherState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop requests whose caller stopped waiting.
    pub fn discard_cancelled(&mut self) {
        self.pending.retain(|reply| !reply.is_closed());
    }
}
