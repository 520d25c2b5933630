//! Snapshot types for the tracked entity kinds.

use std::any::Any;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{same_info, EntityId, EntityInfo};

/// Entity kind names.
pub mod kind {
    /// Machines.
    pub const MACHINE: &str = "machine";
    /// Applications (workloads).
    pub const APPLICATION: &str = "application";
    /// Units of an application.
    pub const UNIT: &str = "unit";
    /// Relations between applications.
    pub const RELATION: &str = "relation";
    /// Annotations attached to any entity.
    pub const ANNOTATION: &str = "annotation";
    /// Agent and workload statuses.
    pub const STATUS: &str = "status";

    /// Map a storage collection name to the kind it holds.
    pub fn for_collection(collection: &str) -> Option<&'static str> {
        match collection {
            "machines" => Some(MACHINE),
            "applications" => Some(APPLICATION),
            "units" => Some(UNIT),
            "relations" => Some(RELATION),
            "annotations" => Some(ANNOTATION),
            "statuses" => Some(STATUS),
            _ => None,
        }
    }
}

/// Lifecycle stage of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Life {
    /// Entity is in service.
    #[default]
    Alive,
    /// Entity is being torn down.
    Dying,
    /// Entity is ready for removal.
    Dead,
}

macro_rules! entity_info {
    ($ty:ty, $kind:expr, |$this:ident| $id:expr) => {
        impl EntityInfo for $ty {
            fn entity_id(&self) -> EntityId {
                let $this = self;
                EntityId::new($kind, $id)
            }

            fn as_any(&self) -> &dyn Any {
                self
            }

            fn same_as(&self, other: &dyn EntityInfo) -> bool {
                same_info(self, other)
            }

            fn to_json(&self) -> serde_json::Value {
                serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
            }
        }
    };
}

/// Machine snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInfo {
    /// Machine id ("0", "0/lxd/1").
    pub id: String,
    /// Provider instance id, empty until provisioned.
    pub instance_id: String,
    /// Lifecycle stage.
    pub life: Life,
    /// Jobs the machine agent runs.
    pub jobs: Vec<String>,
    /// Whether the machine votes in controller replication.
    pub has_vote: bool,
}

impl MachineInfo {
    /// Create an unprovisioned, alive machine.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            instance_id: String::new(),
            life: Life::Alive,
            jobs: vec!["host-units".to_string()],
            has_vote: false,
        }
    }

    /// Set the provider instance id.
    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    /// Set the lifecycle stage.
    pub fn with_life(mut self, life: Life) -> Self {
        self.life = life;
        self
    }
}

entity_info!(MachineInfo, kind::MACHINE, |m| m.id.clone());

/// Application snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    /// Application name.
    pub name: String,
    /// Charm the application runs.
    pub charm_url: String,
    /// Whether the application is exposed.
    pub exposed: bool,
    /// Lifecycle stage.
    pub life: Life,
}

impl ApplicationInfo {
    /// Create an application running the given charm.
    pub fn new(name: impl Into<String>, charm_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            charm_url: charm_url.into(),
            exposed: false,
            life: Life::Alive,
        }
    }
}

entity_info!(ApplicationInfo, kind::APPLICATION, |a| a.name.clone());

/// Unit snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInfo {
    /// Unit name ("wordpress/0").
    pub name: String,
    /// Owning application.
    pub application: String,
    /// Machine the unit is assigned to, empty if unassigned.
    pub machine_id: String,
    /// Open ports ("80/tcp").
    pub ports: Vec<String>,
    /// Lifecycle stage.
    pub life: Life,
}

impl UnitInfo {
    /// Create a unit of an application.
    pub fn new(application: &str, number: u32) -> Self {
        Self {
            name: format!("{}/{}", application, number),
            application: application.to_string(),
            machine_id: String::new(),
            ports: Vec::new(),
            life: Life::Alive,
        }
    }

    /// Assign the unit to a machine.
    pub fn on_machine(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = machine_id.into();
        self
    }
}

entity_info!(UnitInfo, kind::UNIT, |u| u.name.clone());

/// Relation snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationInfo {
    /// Relation key ("wordpress:db mysql:server").
    pub key: String,
    /// Numeric relation id.
    pub id: u64,
    /// Endpoints in "application:endpoint" form.
    pub endpoints: Vec<String>,
}

impl RelationInfo {
    /// Create a relation between endpoints. The key is derived from them.
    pub fn new(id: u64, endpoints: Vec<String>) -> Self {
        Self {
            key: endpoints.join(" "),
            id,
            endpoints,
        }
    }
}

entity_info!(RelationInfo, kind::RELATION, |r| r.key.clone());

/// Annotations attached to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationInfo {
    /// Tag of the annotated entity ("machine-0").
    pub tag: String,
    /// Annotation key/value pairs.
    pub annotations: BTreeMap<String, String>,
}

impl AnnotationInfo {
    /// Create an empty annotation set.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            annotations: BTreeMap::new(),
        }
    }

    /// Add an annotation.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

entity_info!(AnnotationInfo, kind::ANNOTATION, |a| a.tag.clone());

/// Status of an agent or workload, keyed by the global key of its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    /// Global key of the owner ("m#0", "u#wordpress/0").
    pub global_key: String,
    /// Status value ("started", "error").
    pub status: String,
    /// Human readable message.
    pub message: String,
}

impl StatusInfo {
    /// Create a status record.
    pub fn new(
        global_key: impl Into<String>,
        status: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            global_key: global_key.into(),
            status: status.into(),
            message: message.into(),
        }
    }
}

entity_info!(StatusInfo, kind::STATUS, |s| s.global_key.clone());
