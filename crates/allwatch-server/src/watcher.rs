//! Client-side watcher handle.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot, watch};

use allwatch_core::Delta;

use crate::coordinator::Request;
use crate::error::{Error, Result};

/// One subscriber's view of the coordinator.
///
/// `next` and `stop` take `&self`, so a watcher shared through an `Arc` can
/// be stopped from one task while another is waiting in `next`. Dropping the
/// watcher stops it.
#[derive(Debug)]
pub struct Watcher {
    id: u64,
    requests: mpsc::UnboundedSender<Request>,
    stopped: AtomicBool,
    stop_signal: watch::Sender<bool>,
}

impl Watcher {
    pub(crate) fn new(id: u64, requests: mpsc::UnboundedSender<Request>) -> Self {
        let (stop_signal, _) = watch::channel(false);
        Self {
            id,
            requests,
            stopped: AtomicBool::new(false),
            stop_signal,
        }
    }

    /// Watcher id assigned by the coordinator handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next non-empty batch of deltas.
    ///
    /// Fails with [`Error::Stopped`] once the watcher is stopped, and with
    /// [`Error::BackingUnavailable`] if the coordinator halted. There is no
    /// timeout; wrap the call in `tokio::time::timeout` to get one.
    pub async fn next(&self) -> Result<Vec<Delta>> {
        let mut stop_signal = self.stop_signal.subscribe();
        if self.is_stopped() {
            return Err(Error::Stopped);
        }

        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Next {
                watcher_id: self.id,
                reply,
            })
            .map_err(|_| self.gone())?;

        // The coordinator only sees the stop between changes, so the wait
        // must not depend on it.
        tokio::select! {
            biased;

            _ = stop_signal.changed() => Err(Error::Stopped),
            outcome = response => {
                let outcome = outcome.map_err(|_| self.gone())?;
                if self.is_stopped() {
                    return Err(Error::Stopped);
                }
                outcome
            }
        }
    }

    /// Stop the watcher. Idempotent and non-blocking.
    ///
    /// An outstanding `next` resolves with [`Error::Stopped`] at once, even
    /// if a batch for it is already on the way.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_signal.send_replace(true);
        let _ = self.requests.send(Request::Stop {
            watcher_id: self.id,
        });
    }

    /// Whether `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn gone(&self) -> Error {
        if self.is_stopped() {
            Error::Stopped
        } else {
            Error::Shutdown
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}
