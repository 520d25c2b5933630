//! The coordinator task.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use allwatch_core::{Backing, Delta, EntityId, SharedInfo, SharedMetricsRegistry, Store};

use super::handle::CoordinatorHandle;
use super::message::{ChangeMessage, CoordinatorStats, EntrySnapshot, Request};
use super::watcher_state::WatcherState;
use crate::config::CoordinatorConfig;
use crate::error::{Error, Result};

/// Single owner of the store and of all watcher bookkeeping.
pub struct Coordinator {
    store: Store,
    backing: Arc<dyn Backing>,
    watchers: HashMap<u64, WatcherState>,
    requests: mpsc::UnboundedReceiver<Request>,
    changes: mpsc::Receiver<ChangeMessage>,
    config: CoordinatorConfig,
    metrics: SharedMetricsRegistry,
}

impl Coordinator {
    /// Seed a store from the backing and spawn the coordinator task.
    ///
    /// The join handle resolves when every handle and watcher is gone, or
    /// with [`Error::BackingUnavailable`] once the coordinator halts.
    pub async fn start(
        backing: Arc<dyn Backing>,
        config: CoordinatorConfig,
        metrics: SharedMetricsRegistry,
    ) -> Result<(CoordinatorHandle, JoinHandle<Result<()>>)> {
        config.validate()?;

        let mut store = Store::new();
        backing
            .get_all(&mut store)
            .await
            .map_err(|e| Error::BackingUnavailable(format!("initial load: {}", e)))?;

        info!(
            entities = store.len(),
            revno = store.latest_revno(),
            "store seeded from backing"
        );

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (change_tx, change_rx) = mpsc::channel(config.change_buffer);

        let coordinator = Coordinator {
            store,
            backing,
            watchers: HashMap::new(),
            requests: request_rx,
            changes: change_rx,
            config,
            metrics: metrics.clone(),
        };

        let task = tokio::spawn(coordinator.run());
        let handle = CoordinatorHandle::new(
            request_tx,
            change_tx,
            Arc::new(AtomicU64::new(1)),
            metrics,
        );

        Ok((handle, task))
    }

    /// Run the coordinator loop.
    async fn run(mut self) -> Result<()> {
        info!("coordinator started");
        let mut changes_open = true;

        loop {
            tokio::select! {
                biased;

                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },

                message = self.changes.recv(), if changes_open => match message {
                    Some(ChangeMessage::Changed(id)) => {
                        if let Err(error) = self.changed(id).await {
                            return self.halt(error).await;
                        }
                    }
                    Some(ChangeMessage::Barrier(ack)) => {
                        let _ = ack.send(());
                    }
                    None => {
                        debug!("change channel closed");
                        changes_open = false;
                    }
                },
            }
        }

        info!(
            revno = self.store.latest_revno(),
            "coordinator stopped (all handles dropped)"
        );
        Ok(())
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Subscribe { watcher_id } => {
                self.watchers.insert(watcher_id, WatcherState::new());
                self.metrics.record_subscribe();
                debug!(watcher_id, "watcher subscribed");
            }
            Request::Next { watcher_id, reply } => {
                let Some(watcher) = self.watchers.get_mut(&watcher_id) else {
                    let _ = reply.send(Err(Error::Stopped));
                    return;
                };
                watcher.discard_cancelled();
                watcher.pending.push_back(reply);
                if watcher.pending.len() == 1 {
                    self.respond_to(watcher_id);
                }
            }
            Request::Stop { watcher_id } => self.stop_watcher(watcher_id),
            Request::Stats { reply } => {
                let _ = reply.send(Ok(self.stats()));
            }
            Request::Inspect { id, reply } => {
                let _ = reply.send(Ok(self.store.get(&id).map(EntrySnapshot::from)));
            }
        }
    }

    /// Bring the store up to date with the backing for one entity.
    async fn changed(&mut self, id: EntityId) -> Result<()> {
        self.metrics.record_change();

        let mutation = match self.fetch(&id).await? {
            Some(info) => self.store.update(info),
            None => self.store.mark_removed(&id),
        };
        self.metrics.record_mutation(mutation);

        trace!(
            entity = %id,
            ?mutation,
            revno = self.store.latest_revno(),
            "change applied"
        );

        if mutation.is_change() {
            self.respond();
        }
        Ok(())
    }

    async fn fetch(&self, id: &EntityId) -> Result<Option<SharedInfo>> {
        let mut attempt = 1;
        loop {
            match self.backing.fetch(id).await {
                Ok(info) => return Ok(info),
                Err(e) => {
                    self.metrics.record_fetch_failure();
                    if attempt >= self.config.fetch_attempts {
                        return Err(Error::BackingUnavailable(format!(
                            "fetch {} failed after {} attempts: {}",
                            id, attempt, e
                        )));
                    }
                    warn!(entity = %id, attempt, error = %e, "fetch failed, retrying");
                    tokio::time::sleep(self.config.retry_backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Try to satisfy every watcher with an outstanding request.
    fn respond(&mut self) {
        let waiting: Vec<u64> = self
            .watchers
            .iter()
            .filter(|(_, watcher)| !watcher.pending.is_empty())
            .map(|(&watcher_id, _)| watcher_id)
            .collect();

        for watcher_id in waiting {
            self.respond_to(watcher_id);
        }
    }

    /// Deliver the watcher's outstanding changes to its oldest request.
    ///
    /// Reference counts and the watcher's position only move once the batch
    /// has been handed over, so a caller that gave up waiting loses nothing.
    fn respond_to(&mut self, watcher_id: u64) {
        let Some(watcher) = self.watchers.get_mut(&watcher_id) else {
            return;
        };
        watcher.discard_cancelled();
        if watcher.pending.is_empty() {
            return;
        }

        let changes = self.store.changes_since(watcher.last_revno);
        let Some(max_revno) = changes.last().map(|delta| delta.revno) else {
            return;
        };

        // Removals of entities this watcher never saw are not its business.
        let batch: Vec<Delta> = changes
            .into_iter()
            .filter(|delta| !delta.removed || watcher.observed.contains(&delta.id))
            .collect();

        if batch.is_empty() {
            watcher.last_revno = max_revno;
            return;
        }

        let effects: Vec<(EntityId, bool)> = batch
            .iter()
            .map(|delta| (delta.id.clone(), delta.removed))
            .collect();
        let size = batch.len();

        let mut outcome = Ok(batch);
        let delivered = loop {
            let Some(reply) = watcher.pending.pop_front() else {
                break false;
            };
            match reply.send(outcome) {
                Ok(()) => break true,
                Err(returned) => {
                    debug!(watcher_id, "watcher stopped waiting before delivery");
                    outcome = returned;
                }
            }
        };
        if !delivered {
            return;
        }

        watcher.last_revno = max_revno;
        for (id, removed) in effects {
            if removed {
                watcher.observed.remove(&id);
                if self.store.dec_ref(&id) {
                    self.metrics.record_tombstone_released();
                }
            } else if !watcher.observed.contains(&id) {
                self.store.inc_ref(&id);
                watcher.observed.insert(id);
            }
        }

        self.metrics.record_batch(size);
        debug!(watcher_id, deltas = size, revno = max_revno, "batch delivered");
    }

    fn stop_watcher(&mut self, watcher_id: u64) {
        let Some(mut watcher) = self.watchers.remove(&watcher_id) else {
            return;
        };

        let released = watcher.observed.len();
        for id in watcher.observed.drain() {
            if self.store.dec_ref(&id) {
                self.metrics.record_tombstone_released();
            }
        }
        for reply in watcher.pending.drain(..) {
            let _ = reply.send(Err(Error::Stopped));
        }

        self.metrics.record_stop();
        debug!(watcher_id, released, "watcher stopped");
    }

    fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            latest_revno: self.store.latest_revno(),
            entries: self.store.len(),
            tombstones: self.store.tombstone_count(),
            watchers: self.watchers.len(),
            pending_requests: self
                .watchers
                .values()
                .map(|watcher| watcher.pending.len())
                .sum(),
        }
    }

    /// Fail every watcher and answer all further requests with the error.
    async fn halt(mut self, error: Error) -> Result<()> {
        let reason = match error {
            Error::BackingUnavailable(reason) => reason,
            other => other.to_string(),
        };
        error!(reason = %reason, "backing unavailable, coordinator halting");

        let unavailable = || Error::BackingUnavailable(reason.clone());

        for (_, watcher) in self.watchers.drain() {
            for reply in watcher.pending {
                let _ = reply.send(Err(unavailable()));
            }
        }
        self.changes.close();

        while let Some(request) = self.requests.recv().await {
            match request {
                Request::Next { reply, .. } => {
                    let _ = reply.send(Err(unavailable()));
                }
                Request::Stats { reply } => {
                    let _ = reply.send(Err(unavailable()));
                }
                Request::Inspect { reply, .. } => {
                    let _ = reply.send(Err(unavailable()));
                }
                Request::Subscribe { .. } | Request::Stop { .. } => {}
            }
        }

        Err(unavailable())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use allwatch_core::{new_shared_registry, MachineInfo, MemoryBacking};

    use super::*;

    async fn start(backing: Arc<MemoryBacking>) -> (CoordinatorHandle, JoinHandle<Result<()>>) {
        let config = CoordinatorConfig::new()
            .with_fetch_attempts(2)
            .with_retry_backoff(Duration::from_millis(1));
        Coordinator::start(backing, config, new_shared_registry())
            .await
            .unwrap()
    }

    fn machine_id(id: &str) -> EntityId {
        EntityId::new("machine", id)
    }

    #[tokio::test]
    async fn test_first_batch_is_full_snapshot() {
        let backing = Arc::new(MemoryBacking::with_entities([
            Arc::new(MachineInfo::new("0")) as SharedInfo,
            Arc::new(MachineInfo::new("1")),
        ]));
        let (handle, _task) = start(backing).await;

        let watcher = handle.subscribe();
        let batch = watcher.next().await.unwrap();
        assert_eq!(batch.len(), 2);

        let entry = handle.inspect(&machine_id("0")).await.unwrap().unwrap();
        assert_eq!(entry.ref_count, 1);
    }

    #[tokio::test]
    async fn test_start_fails_when_backing_is_down() {
        let backing = Arc::new(MemoryBacking::new());
        backing.set_unavailable(true);

        let result = Coordinator::start(backing, CoordinatorConfig::new(), new_shared_registry()).await;
        assert!(matches!(result, Err(Error::BackingUnavailable(_))));
    }

    #[tokio::test]
    async fn test_start_rejects_bad_config() {
        let backing = Arc::new(MemoryBacking::new());
        let config = CoordinatorConfig::new().with_fetch_attempts(0);

        let result = Coordinator::start(backing, config, new_shared_registry()).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_unchanged_fetch_does_not_wake_watchers() {
        let backing = Arc::new(MemoryBacking::with_entities([
            Arc::new(MachineInfo::new("0")) as SharedInfo,
        ]));
        let (handle, _task) = start(backing).await;

        let watcher = handle.subscribe();
        watcher.next().await.unwrap();

        // Same info again, as an at-least-once feed may deliver.
        handle.changed(machine_id("0")).await.unwrap();
        handle.sync().await.unwrap();

        let pending = tokio::time::timeout(Duration::from_millis(50), watcher.next()).await;
        assert!(pending.is_err());
        assert_eq!(handle.stats().await.unwrap().latest_revno, 1);
    }

    #[tokio::test]
    async fn test_run_ends_when_handles_dropped() {
        let backing = Arc::new(MemoryBacking::new());
        let (handle, task) = start(backing).await;

        let watcher = handle.subscribe();
        drop(watcher);
        drop(handle);

        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_stats_counts_pending_requests() {
        let backing = Arc::new(MemoryBacking::new());
        let (handle, _task) = start(backing).await;

        let watcher = Arc::new(handle.subscribe());
        let waiting = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.next().await })
        };

        // The watcher has nothing to see yet, so its request stays queued.
        let mut stats = handle.stats().await.unwrap();
        for _ in 0..100 {
            if stats.pending_requests == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
            stats = handle.stats().await.unwrap();
        }
        assert_eq!(stats.watchers, 1);
        assert_eq!(stats.pending_requests, 1);

        watcher.stop();
        assert!(matches!(waiting.await.unwrap(), Err(Error::Stopped)));
    }
}
