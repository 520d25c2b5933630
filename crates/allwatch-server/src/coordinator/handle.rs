//! Cloneable handle to a running coordinator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use allwatch_core::{EntityId, SharedMetricsRegistry};

use super::message::{ChangeMessage, CoordinatorStats, EntrySnapshot, Request};
use crate::error::{Error, Result};
use crate::watcher::Watcher;

/// Handle for subscribing watchers and reporting changes.
#[derive(Clone)]
pub struct CoordinatorHandle {
    requests: mpsc::UnboundedSender<Request>,
    changes: mpsc::Sender<ChangeMessage>,
    next_watcher_id: Arc<AtomicU64>,
    metrics: SharedMetricsRegistry,
}

impl CoordinatorHandle {
    pub(crate) fn new(
        requests: mpsc::UnboundedSender<Request>,
        changes: mpsc::Sender<ChangeMessage>,
        next_watcher_id: Arc<AtomicU64>,
        metrics: SharedMetricsRegistry,
    ) -> Self {
        Self {
            requests,
            changes,
            next_watcher_id,
            metrics,
        }
    }

    /// Register a new watcher.
    ///
    /// Its first batch is a snapshot of every live entity.
    pub fn subscribe(&self) -> Watcher {
        let watcher_id = self.next_watcher_id.fetch_add(1, Ordering::SeqCst);
        // A send failure surfaces on the watcher's first `next`.
        let _ = self.requests.send(Request::Subscribe { watcher_id });
        Watcher::new(watcher_id, self.requests.clone())
    }

    /// Report that an entity may have changed in the backing.
    ///
    /// Waits while the change channel is full.
    pub async fn changed(&self, id: EntityId) -> Result<()> {
        self.changes
            .send(ChangeMessage::Changed(id))
            .await
            .map_err(|_| Error::Shutdown)
    }

    /// Wait until every change reported before this call has been applied.
    pub async fn sync(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.changes
            .send(ChangeMessage::Barrier(ack))
            .await
            .map_err(|_| Error::Shutdown)?;
        done.await.map_err(|_| Error::Shutdown)
    }

    /// Current coordinator statistics.
    pub async fn stats(&self) -> Result<CoordinatorStats> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Stats { reply })
            .map_err(|_| Error::Shutdown)?;
        response.await.map_err(|_| Error::Shutdown)?
    }

    /// Store state of one entity, `None` if the store does not hold it.
    pub async fn inspect(&self, id: &EntityId) -> Result<Option<EntrySnapshot>> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Inspect {
                id: id.clone(),
                reply,
            })
            .map_err(|_| Error::Shutdown)?;
        response.await.map_err(|_| Error::Shutdown)?
    }

    /// The metrics registry the coordinator records into.
    pub fn metrics(&self) -> &SharedMetricsRegistry {
        &self.metrics
    }
}
