//! Strongly-typed identifiers for registry concepts.
//!
//! These newtypes keep container numbers, connector ids and node ids from
//! being mixed up at the registry boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_numeric_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

define_numeric_id!(
    /// Stable numeric identity of an open top-level container (a file number).
    ContainerId
);
define_numeric_id!(
    /// Identifier of the underlying library instance servicing a handle.
    ConnectorId
);
define_numeric_id!(
    /// Registry-assigned identifier of a metadata node, unique per registry.
    NodeId
);

/// Identity of one registry instance (one per execution context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryId(Uuid);

impl RegistryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registry-{}", self.0)
    }
}

/// The four kinds of sub-object tracked inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Dataset,
    Group,
    Datatype,
    Attribute,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 4] = [
        ObjectKind::Dataset,
        ObjectKind::Group,
        ObjectKind::Datatype,
        ObjectKind::Attribute,
    ];

    /// Position of this kind in per-kind arrays.
    pub const fn index(self) -> usize {
        match self {
            ObjectKind::Dataset => 0,
            ObjectKind::Group => 1,
            ObjectKind::Datatype => 2,
            ObjectKind::Attribute => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Dataset => "dataset",
            ObjectKind::Group => "group",
            ObjectKind::Datatype => "datatype",
            ObjectKind::Attribute => "attribute",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
