//! Contract with the source of truth behind the store.
//!
//! A [`Backing`] knows how to read the current state of tracked entities from
//! wherever they really live, and how to turn raw storage notifications into
//! entity ids. [`MemoryBacking`] keeps that state in a map, for tests and
//! demos.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::entity::{EntityId, SharedInfo};
use crate::error::{Error, Result};
use crate::info::kind;
use crate::store::Store;

/// A raw change notification from the storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    /// Collection the changed document lives in.
    pub collection: String,
    /// Id of the changed document.
    pub doc_id: String,
}

impl RawChange {
    /// Create a new raw change.
    pub fn new(collection: impl Into<String>, doc_id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            doc_id: doc_id.into(),
        }
    }
}

/// Source of truth for tracked entities.
#[async_trait]
pub trait Backing: Send + Sync + 'static {
    /// Load every currently live entity into the store.
    async fn get_all(&self, store: &mut Store) -> Result<()>;

    /// Fetch the current snapshot of an entity, `None` if it no longer exists.
    async fn fetch(&self, id: &EntityId) -> Result<Option<SharedInfo>>;

    /// Map a raw change to the entity it affects, `None` if untracked.
    fn classify(&self, change: &RawChange) -> Option<EntityId> {
        kind::for_collection(&change.collection).map(|kind| EntityId::new(kind, &change.doc_id))
    }
}

/// In-memory backing keyed by entity id.
#[derive(Debug, Default)]
pub struct MemoryBacking {
    entities: RwLock<BTreeMap<EntityId, SharedInfo>>,
    unavailable: AtomicBool,
}

impl MemoryBacking {
    /// Create an empty backing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backing holding the given snapshots.
    pub fn with_entities(infos: impl IntoIterator<Item = SharedInfo>) -> Self {
        let backing = Self::new();
        for info in infos {
            backing.put(info);
        }
        backing
    }

    /// Insert or replace an entity. Returns its id.
    pub fn put(&self, info: SharedInfo) -> EntityId {
        let id = info.entity_id();
        self.entities.write().insert(id.clone(), info);
        id
    }

    /// Remove an entity. Returns true if it existed.
    pub fn remove(&self, id: &EntityId) -> bool {
        self.entities.write().remove(id).is_some()
    }

    /// Current snapshot of an entity, bypassing availability.
    pub fn get(&self, id: &EntityId) -> Option<SharedInfo> {
        self.entities.read().get(id).cloned()
    }

    /// Ids of all entities of one kind.
    pub fn ids_of_kind(&self, kind: &str) -> Vec<EntityId> {
        self.entities
            .read()
            .keys()
            .filter(|id| id.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of entities held.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Check if the backing holds no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Make every read fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Backing("memory backing marked unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Backing for MemoryBacking {
    async fn get_all(&self, store: &mut Store) -> Result<()> {
        self.check_available()?;
        let entities = self.entities.read();
        for info in entities.values() {
            store.update(info.clone());
        }
        Ok(())
    }

    async fn fetch(&self, id: &EntityId) -> Result<Option<SharedInfo>> {
        self.check_available()?;
        Ok(self.get(id))
    }
}
