//! Revisioned in-memory cache of tracked entities.
//!
//! Every mutation stamps the touched entry with the next value of a store-wide
//! revision counter. Watchers remember the last revision they were shown and
//! ask for everything newer. Removed entities linger as tombstones for as long
//! as some watcher has been shown the entity and not yet its removal.
//!
//! ## Layout
//!
//! ```text
//! entries:  EntityId -> StoreEntry { info, creation_revno, revno, ref_count, removed }
//! by_revno: revno    -> EntityId          (ordered, one key per entry)
//! ```

mod entry;
mod revision_store;

pub use entry::{Mutation, StoreEntry};
pub use revision_store::Store;
