//! allwatch core - entity model, revisioned store, and backing contract.
//!
//! This crate holds everything the watch coordinator needs that does not
//! involve tasks or channels.

pub mod backing;
pub mod entity;
pub mod error;
pub mod info;
pub mod metrics;
pub mod store;

pub use backing::{Backing, MemoryBacking, RawChange};
pub use entity::{same_info, Delta, EntityId, EntityInfo, SharedInfo};
pub use error::{Error, Result};
pub use info::{
    kind, AnnotationInfo, ApplicationInfo, Life, MachineInfo, RelationInfo, StatusInfo, UnitInfo,
};
pub use metrics::{new_shared_registry, MetricsRegistry, SharedMetricsRegistry};
pub use store::{Mutation, Store, StoreEntry};
