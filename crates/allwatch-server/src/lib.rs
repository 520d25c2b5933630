//! allwatch server library.
//!
//! This crate runs the watch coordinator: a single task that owns the entity
//! store, applies changes reported by the change feed, and hands each watcher
//! the deltas it has not seen yet.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod feed;
pub mod watcher;

pub use config::{Args, CoordinatorConfig, ServerConfig};
pub use coordinator::{Coordinator, CoordinatorHandle, CoordinatorStats, EntrySnapshot};
pub use error::{Error, Result};
pub use feed::{start_feed, ChangeFeed, FeedHandle};
pub use watcher::Watcher;
