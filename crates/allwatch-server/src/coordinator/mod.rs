//! The watch coordinator.
//!
//! One task owns the entity store and the bookkeeping of every watcher. The
//! change feed and the watchers talk to it only through channels:
//!
//! ```text
//! feed ──ChangeMessage──▶ ┌─────────────┐ ◀──Request── Watcher::next / stop
//!        (bounded)        │ Coordinator │ ──oneshot──▶ delta batch / error
//!                         │  Store      │
//!                         └─────────────┘
//! ```
//!
//! Client requests are always drained before the next change is applied, so
//! a stop takes effect before any later delivery could reach the watcher.

mod actor;
mod handle;
mod message;
mod watcher_state;

pub use actor::Coordinator;
pub use handle::CoordinatorHandle;
pub use message::{CoordinatorStats, EntrySnapshot};

pub(crate) use message::Request;
