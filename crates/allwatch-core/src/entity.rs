//! Entity identity, snapshots, and deltas.
//!
//! The watch core never looks inside an entity snapshot. It only needs to know
//! which entity a snapshot belongs to and whether two snapshots are equal, so
//! snapshots are carried around as `Arc<dyn EntityInfo>`.

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;

use crate::error::Error;

/// Key of a tracked entity: its kind plus an identifier unique within the kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, Deserialize)]
pub struct EntityId {
    /// Entity kind (e.g., "machine").
    pub kind: String,
    /// Identifier within the kind (e.g., "0").
    pub id: String,
}

impl EntityId {
    /// Create a new entity id.
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

impl FromStr for EntityId {
    type Err = Error;

    /// Parse the `kind/id` form produced by `Display`. Only the first `/`
    /// separates, so ids such as unit names (`wordpress/0`) survive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((kind, id)) if !kind.is_empty() && !id.is_empty() => Ok(Self::new(kind, id)),
            _ => Err(Error::InvalidId(s.to_string())),
        }
    }
}

/// Immutable snapshot of one entity's visible fields.
pub trait EntityInfo: fmt::Debug + Send + Sync + 'static {
    /// The id of the entity this snapshot describes.
    fn entity_id(&self) -> EntityId;

    /// Access to the concrete type, for consumers that know what they asked for.
    fn as_any(&self) -> &dyn Any;

    /// Whether `other` carries exactly the same information.
    ///
    /// Returning `false` is always safe; it only costs a redundant delta.
    fn same_as(&self, other: &dyn EntityInfo) -> bool {
        let _ = other;
        false
    }

    /// JSON rendering used when deltas leave the process or get logged.
    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

impl dyn EntityInfo {
    /// Downcast to a concrete snapshot type.
    pub fn downcast_ref<T: EntityInfo>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Shared, immutable snapshot.
pub type SharedInfo = Arc<dyn EntityInfo>;

/// Compare a snapshot against another of possibly different concrete type.
///
/// Helper for `EntityInfo::same_as` implementations on `PartialEq` types.
pub fn same_info<T: EntityInfo + PartialEq>(this: &T, other: &dyn EntityInfo) -> bool {
    other
        .as_any()
        .downcast_ref::<T>()
        .is_some_and(|other| other == this)
}

/// One change record delivered to a watcher.
#[derive(Debug, Clone)]
pub struct Delta {
    /// The entity that changed.
    pub id: EntityId,
    /// Store revision at which the change was recorded.
    pub revno: u64,
    /// Whether the entity has been removed.
    pub removed: bool,
    /// Current snapshot, or the last known one for a removal.
    pub info: SharedInfo,
}

impl Delta {
    /// Downcast the carried snapshot.
    pub fn info_as<T: EntityInfo>(&self) -> Option<&T> {
        self.info.downcast_ref::<T>()
    }
}

impl Serialize for Delta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Delta", 5)?;
        state.serialize_field("kind", &self.id.kind)?;
        state.serialize_field("id", &self.id.id)?;
        state.serialize_field("revno", &self.revno)?;
        state.serialize_field("removed", &self.removed)?;
        state.serialize_field("info", &self.info.to_json())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::MachineInfo;

    #[test]
    fn test_entity_id_display_and_parse() {
        let id = EntityId::new("unit", "wordpress/0");
        assert_eq!(id.to_string(), "unit/wordpress/0");

        let parsed: EntityId = "unit/wordpress/0".parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_entity_id_parse_rejects_garbage() {
        assert!("machine".parse::<EntityId>().is_err());
        assert!("/0".parse::<EntityId>().is_err());
        assert!("machine/".parse::<EntityId>().is_err());
    }

    #[test]
    fn test_same_info_across_types() {
        let a = MachineInfo::new("0");
        let b = MachineInfo::new("0");
        let c = MachineInfo::new("1");
        let status = crate::info::StatusInfo::new("m#0", "started", "");

        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert!(!a.same_as(&status));
    }

    #[test]
    fn test_delta_serializes_flat() {
        let delta = Delta {
            id: EntityId::new("machine", "0"),
            revno: 7,
            removed: false,
            info: Arc::new(MachineInfo::new("0")),
        };

        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(json["kind"], "machine");
        assert_eq!(json["id"], "0");
        assert_eq!(json["revno"], 7);
        assert_eq!(json["removed"], false);
        assert_eq!(json["info"]["id"], "0");
    }

    #[test]
    fn test_delta_downcast() {
        let delta = Delta {
            id: EntityId::new("machine", "3"),
            revno: 1,
            removed: true,
            info: Arc::new(MachineInfo::new("3")),
        };

        assert_eq!(delta.info_as::<MachineInfo>().unwrap().id, "3");
        assert!(delta.info_as::<crate::info::UnitInfo>().is_none());
    }
}
