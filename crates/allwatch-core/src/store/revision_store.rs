//! The revisioned entity store.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Unbounded};

use super::entry::{Mutation, StoreEntry};
use crate::entity::{Delta, EntityId, SharedInfo};

/// In-memory cache of live entities and tombstones, ordered by revision.
///
/// The store is not synchronized. It is meant to be owned by a single task
/// that serializes all access to it.
#[derive(Debug, Default)]
pub struct Store {
    /// Revision of the most recent mutation.
    latest_revno: u64,
    /// Entries keyed by entity id.
    entries: HashMap<EntityId, StoreEntry>,
    /// Entity ids keyed by the revision of their latest mutation.
    by_revno: BTreeMap<u64, EntityId>,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Revision of the most recent mutation, 0 if none.
    pub fn latest_revno(&self) -> u64 {
        self.latest_revno
    }

    /// Number of entries, tombstones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of tombstones awaiting release.
    pub fn tombstone_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.removed).count()
    }

    /// Look up an entry.
    pub fn get(&self, id: &EntityId) -> Option<&StoreEntry> {
        self.entries.get(id)
    }

    /// Check if an entry (live or tombstone) exists.
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert a new entity.
    ///
    /// # Panics
    ///
    /// Panics if the entity is already present; use [`Store::update`] when
    /// the caller cannot know.
    pub fn add(&mut self, info: SharedInfo) -> Mutation {
        let id = info.entity_id();
        assert!(
            !self.entries.contains_key(&id),
            "add of entity {} that is already in the store",
            id
        );

        let revno = self.next_revno();
        self.by_revno.insert(revno, id.clone());
        tracing::trace!(entity = %id, revno, "store add");
        self.entries.insert(id, StoreEntry::new(info, revno));

        Mutation::Added
    }

    /// Record the latest snapshot of an entity.
    ///
    /// Unknown entities are added. Known entities get the new info and a new
    /// revision, and are revived if they were tombstones. An update carrying
    /// the same info as a live entry is ignored.
    pub fn update(&mut self, info: SharedInfo) -> Mutation {
        let id = info.entity_id();
        let Some(entry) = self.entries.get(&id) else {
            return self.add(info);
        };

        if !entry.removed && entry.info.same_as(info.as_ref()) {
            return Mutation::Unchanged;
        }

        let old_revno = entry.revno;
        let revno = self.next_revno();
        self.by_revno.remove(&old_revno);
        self.by_revno.insert(revno, id.clone());

        if let Some(entry) = self.entries.get_mut(&id) {
            entry.info = info;
            entry.revno = revno;
            entry.removed = false;
        }
        tracing::trace!(entity = %id, revno, "store update");

        Mutation::Updated
    }

    /// Mark an entity as removed.
    ///
    /// Entries nobody references are deleted at once. Referenced entries stay
    /// behind as tombstones until [`Store::dec_ref`] releases the last
    /// reference. Removing an absent entity or an existing tombstone does
    /// nothing.
    pub fn mark_removed(&mut self, id: &EntityId) -> Mutation {
        let (old_revno, ref_count) = match self.entries.get(id) {
            None => return Mutation::Unchanged,
            Some(entry) if entry.removed => return Mutation::Unchanged,
            Some(entry) => (entry.revno, entry.ref_count),
        };

        // The counter ticks even when the entry is deleted outright, so
        // `latest_revno` still moves past the removal.
        let revno = self.next_revno();
        self.by_revno.remove(&old_revno);

        if ref_count == 0 {
            self.entries.remove(id);
            tracing::trace!(entity = %id, revno, "store delete");
            return Mutation::Deleted;
        }

        self.by_revno.insert(revno, id.clone());
        if let Some(entry) = self.entries.get_mut(id) {
            entry.revno = revno;
            entry.removed = true;
        }
        tracing::trace!(entity = %id, revno, ref_count, "store tombstone");

        Mutation::Tombstoned
    }

    /// Record that one more watcher has been shown the entity.
    ///
    /// # Panics
    ///
    /// Panics if the entity is not in the store.
    pub fn inc_ref(&mut self, id: &EntityId) {
        match self.entries.get_mut(id) {
            Some(entry) => entry.ref_count += 1,
            None => panic!("inc_ref of entity {} that is not in the store", id),
        }
    }

    /// Release one watcher's reference to the entity.
    ///
    /// Deletes the entry when the last reference to a tombstone goes away.
    /// Returns true if the entry was deleted.
    ///
    /// # Panics
    ///
    /// Panics if the entity is absent or has no references.
    pub fn dec_ref(&mut self, id: &EntityId) -> bool {
        let Some(entry) = self.entries.get_mut(id) else {
            panic!("dec_ref of entity {} that is not in the store", id);
        };
        assert!(
            entry.ref_count > 0,
            "dec_ref of entity {} with no references",
            id
        );

        entry.ref_count -= 1;
        if entry.ref_count > 0 || !entry.removed {
            return false;
        }

        let revno = entry.revno;
        self.by_revno.remove(&revno);
        self.entries.remove(id);
        tracing::trace!(entity = %id, revno, "store release tombstone");
        true
    }

    /// All changes recorded after `since`, oldest first.
    ///
    /// Tombstones of entities created after `since` are left out: whoever is
    /// at `since` never learned those entities existed.
    pub fn changes_since(&self, since: u64) -> Vec<Delta> {
        self.by_revno
            .range((Excluded(since), Unbounded))
            .filter_map(|(_, id)| {
                let entry = self.entries.get(id)?;
                if entry.removed && entry.creation_revno > since {
                    return None;
                }
                Some(entry.to_delta(id))
            })
            .collect()
    }

    fn next_revno(&mut self) -> u64 {
        self.latest_revno += 1;
        self.latest_revno
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::info::{MachineInfo, UnitInfo};

    fn machine(id: &str) -> SharedInfo {
        Arc::new(MachineInfo::new(id))
    }

    fn machine_id(id: &str) -> EntityId {
        EntityId::new("machine", id)
    }

    fn ids(deltas: &[Delta]) -> Vec<String> {
        deltas.iter().map(|d| d.id.to_string()).collect()
    }

    #[test]
    fn test_add_assigns_revisions() {
        let mut store = Store::new();
        assert_eq!(store.add(machine("0")), Mutation::Added);
        assert_eq!(store.add(machine("1")), Mutation::Added);

        let entry = store.get(&machine_id("1")).unwrap();
        assert_eq!(entry.creation_revno(), 2);
        assert_eq!(entry.revno(), 2);
        assert_eq!(entry.ref_count(), 0);
        assert!(!entry.is_removed());

        let changes = store.changes_since(0);
        assert_eq!(ids(&changes), vec!["machine/0", "machine/1"]);
        assert_eq!(changes[0].revno, 1);
        assert_eq!(changes[1].revno, 2);
    }

    #[test]
    #[should_panic(expected = "already in the store")]
    fn test_add_existing_panics() {
        let mut store = Store::new();
        store.add(machine("0"));
        store.add(machine("0"));
    }

    #[test]
    fn test_update_absent_adds() {
        let mut store = Store::new();
        assert_eq!(store.update(machine("0")), Mutation::Added);
        assert_eq!(store.get(&machine_id("0")).unwrap().creation_revno(), 1);
    }

    #[test]
    fn test_update_moves_entry_to_newest() {
        let mut store = Store::new();
        store.add(machine("0"));
        store.add(machine("1"));

        let updated = Arc::new(MachineInfo::new("0").with_instance_id("i-0"));
        assert_eq!(store.update(updated), Mutation::Updated);

        let entry = store.get(&machine_id("0")).unwrap();
        assert_eq!(entry.creation_revno(), 1);
        assert_eq!(entry.revno(), 3);

        assert_eq!(ids(&store.changes_since(0)), vec!["machine/1", "machine/0"]);
        assert_eq!(ids(&store.changes_since(2)), vec!["machine/0"]);
        assert!(store.changes_since(3).is_empty());
    }

    #[test]
    fn test_update_with_same_info_is_noop() {
        let mut store = Store::new();
        store.add(machine("0"));

        assert_eq!(store.update(machine("0")), Mutation::Unchanged);
        assert_eq!(store.latest_revno(), 1);
    }

    #[test]
    fn test_update_revives_tombstone() {
        let mut store = Store::new();
        store.add(machine("0"));
        store.inc_ref(&machine_id("0"));
        store.mark_removed(&machine_id("0"));

        assert_eq!(store.update(machine("0")), Mutation::Updated);

        let entry = store.get(&machine_id("0")).unwrap();
        assert!(!entry.is_removed());
        assert_eq!(entry.ref_count(), 1);
        assert_eq!(entry.revno(), 3);
    }

    #[test]
    fn test_mark_removed_unreferenced_deletes() {
        let mut store = Store::new();
        store.add(machine("0"));

        assert_eq!(store.mark_removed(&machine_id("0")), Mutation::Deleted);
        assert!(store.is_empty());
        assert!(store.changes_since(0).is_empty());
        assert_eq!(store.latest_revno(), 2);
    }

    #[test]
    fn test_mark_removed_absent_is_noop() {
        let mut store = Store::new();
        assert_eq!(store.mark_removed(&machine_id("9")), Mutation::Unchanged);
        assert_eq!(store.latest_revno(), 0);
    }

    #[test]
    fn test_mark_removed_twice_bumps_once() {
        let mut store = Store::new();
        store.add(machine("0"));
        store.inc_ref(&machine_id("0"));

        assert_eq!(store.mark_removed(&machine_id("0")), Mutation::Tombstoned);
        assert_eq!(store.mark_removed(&machine_id("0")), Mutation::Unchanged);
        assert_eq!(store.latest_revno(), 2);

        let changes = store.changes_since(1);
        assert_eq!(changes.len(), 1);
        assert!(changes[0].removed);
    }

    #[test]
    fn test_tombstone_hidden_from_watchers_that_never_saw_it() {
        let mut store = Store::new();
        store.add(machine("0"));
        store.add(machine("1"));
        store.inc_ref(&machine_id("0"));
        store.mark_removed(&machine_id("0"));

        // A watcher starting from scratch only learns about machine 1.
        assert_eq!(ids(&store.changes_since(0)), vec!["machine/1"]);

        // A watcher that was at revision 1 knew about machine 0.
        let changes = store.changes_since(1);
        assert_eq!(ids(&changes), vec!["machine/1", "machine/0"]);
        assert!(changes[1].removed);
    }

    #[test]
    fn test_dec_ref_releases_tombstone() {
        let mut store = Store::new();
        store.add(machine("0"));
        store.inc_ref(&machine_id("0"));
        store.inc_ref(&machine_id("0"));
        store.mark_removed(&machine_id("0"));
        assert_eq!(store.tombstone_count(), 1);

        assert!(!store.dec_ref(&machine_id("0")));
        assert_eq!(store.get(&machine_id("0")).unwrap().ref_count(), 1);

        assert!(store.dec_ref(&machine_id("0")));
        assert!(store.get(&machine_id("0")).is_none());
        assert_eq!(store.tombstone_count(), 0);
        assert!(store.changes_since(1).is_empty());
    }

    #[test]
    fn test_dec_ref_keeps_live_entry() {
        let mut store = Store::new();
        store.add(machine("0"));
        store.inc_ref(&machine_id("0"));

        assert!(!store.dec_ref(&machine_id("0")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    #[should_panic(expected = "no references")]
    fn test_dec_ref_below_zero_panics() {
        let mut store = Store::new();
        store.add(machine("0"));
        store.dec_ref(&machine_id("0"));
    }

    #[test]
    #[should_panic(expected = "not in the store")]
    fn test_inc_ref_absent_panics() {
        let mut store = Store::new();
        store.inc_ref(&machine_id("0"));
    }

    #[test]
    fn test_changes_since_mixed_kinds() {
        let mut store = Store::new();
        store.add(machine("0"));
        store.add(Arc::new(UnitInfo::new("wordpress", 0).on_machine("0")));

        let changes = store.changes_since(0);
        assert_eq!(ids(&changes), vec!["machine/0", "unit/wordpress/0"]);
        assert_eq!(
            changes[1].info_as::<UnitInfo>().unwrap().machine_id,
            "0"
        );
    }

    #[test]
    fn test_changes_since_future_revision_is_empty() {
        let mut store = Store::new();
        store.add(machine("0"));
        assert!(store.changes_since(u64::MAX).is_empty());
    }
}
