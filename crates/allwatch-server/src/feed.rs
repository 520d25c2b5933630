//! Raw change feed processing.
//!
//! This module provides a background task that receives raw storage
//! notifications, maps them to tracked entities through the backing, and
//! reports those entities to the coordinator.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use allwatch_core::{Backing, RawChange};

use crate::coordinator::CoordinatorHandle;

/// Feed processor that bridges raw storage notifications to the coordinator.
///
/// Notifications are forwarded one at a time in receipt order, so changes to
/// the same document reach the coordinator in the order they happened.
pub struct ChangeFeed {
    /// Receiver for raw notifications.
    rx: mpsc::Receiver<RawChange>,
    /// Classifier for raw notifications.
    backing: Arc<dyn Backing>,
    /// Coordinator receiving entity changes.
    coordinator: CoordinatorHandle,
}

impl ChangeFeed {
    /// Create a new feed processor.
    pub fn new(
        rx: mpsc::Receiver<RawChange>,
        backing: Arc<dyn Backing>,
        coordinator: CoordinatorHandle,
    ) -> Self {
        Self {
            rx,
            backing,
            coordinator,
        }
    }

    /// Run the feed processor as a background task.
    ///
    /// This will process notifications until the channel is closed or the
    /// coordinator goes away.
    pub async fn run(mut self) {
        info!("change feed started");

        while let Some(change) = self.rx.recv().await {
            if !self.process(change).await {
                warn!("coordinator gone, change feed stopping");
                return;
            }
        }

        info!("change feed stopped (channel closed)");
    }

    /// Forward a single notification. Returns false if the coordinator is gone.
    async fn process(&self, change: RawChange) -> bool {
        let Some(id) = self.backing.classify(&change) else {
            self.coordinator.metrics().record_ignored_change();
            trace!(
                collection = %change.collection,
                doc_id = %change.doc_id,
                "ignoring untracked change"
            );
            return true;
        };

        debug!(entity = %id, "forwarding change");
        self.coordinator.changed(id).await.is_ok()
    }
}

/// Handle for a running feed processor task.
#[derive(Clone)]
pub struct FeedHandle {
    tx: mpsc::Sender<RawChange>,
}

impl FeedHandle {
    /// Submit a notification without waiting.
    ///
    /// Returns an error if the channel is full or closed.
    pub fn try_send(&self, change: RawChange) -> Result<(), mpsc::error::TrySendError<RawChange>> {
        self.tx.try_send(change)
    }

    /// Submit a notification, waiting if the channel is full.
    pub async fn send(&self, change: RawChange) -> Result<(), mpsc::error::SendError<RawChange>> {
        self.tx.send(change).await
    }
}

/// Start a feed processor and return a handle for submitting notifications.
pub fn start_feed(
    backing: Arc<dyn Backing>,
    coordinator: CoordinatorHandle,
    buffer_size: usize,
) -> FeedHandle {
    let (tx, rx) = mpsc::channel(buffer_size);
    let feed = ChangeFeed::new(rx, backing, coordinator);

    tokio::spawn(async move {
        feed.run().await;
    });

    FeedHandle { tx }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use allwatch_core::{new_shared_registry, EntityId, MachineInfo, MemoryBacking};

    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::coordinator::Coordinator;

    #[tokio::test]
    async fn test_feed_forwards_tracked_changes() {
        let backing = Arc::new(MemoryBacking::new());
        let (coordinator, _task) =
            Coordinator::start(backing.clone(), CoordinatorConfig::new(), new_shared_registry())
                .await
                .unwrap();
        let feed = start_feed(backing.clone(), coordinator.clone(), 10);

        let watcher = coordinator.subscribe();
        backing.put(Arc::new(MachineInfo::new("0")));
        feed.send(RawChange::new("machines", "0")).await.unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(1), watcher.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, EntityId::new("machine", "0"));
    }

    #[tokio::test]
    async fn test_feed_ignores_untracked_collections() {
        let backing = Arc::new(MemoryBacking::new());
        let metrics = new_shared_registry();
        let (coordinator, _task) =
            Coordinator::start(backing.clone(), CoordinatorConfig::new(), metrics.clone())
                .await
                .unwrap();
        let (tx, rx) = mpsc::channel(10);
        let feed = ChangeFeed::new(rx, backing, coordinator);
        let task = tokio::spawn(feed.run());

        tx.send(RawChange::new("settings", "r#1")).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(metrics.changes_ignored(), 1);
        assert_eq!(metrics.changes_received(), 0);
    }

    #[tokio::test]
    async fn test_feed_handle_clone() {
        let backing = Arc::new(MemoryBacking::new());
        let (coordinator, _task) =
            Coordinator::start(backing.clone(), CoordinatorConfig::new(), new_shared_registry())
                .await
                .unwrap();
        let handle1 = start_feed(backing, coordinator, 10);
        let handle2 = handle1.clone();

        assert!(handle1.try_send(RawChange::new("units", "mysql/0")).is_ok());
        assert!(handle2.try_send(RawChange::new("machines", "1")).is_ok());
    }
}
