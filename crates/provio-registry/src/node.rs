//! Metadata nodes: one per distinct library object open inside a container.

use provio_core::{ContainerId, NodeId, ObjectKind};
use serde::Serialize;
use std::time::Duration;

/// Copyable reference to a live node, handed out by
/// [`Registry::track_object`](crate::Registry::track_object).
///
/// A handle stays valid until the matching `untrack_object` call drops the
/// node's refcount to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub container: ContainerId,
    pub kind: ObjectKind,
    pub node: NodeId,
}

/// Shape and I/O totals of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetCounters {
    pub type_size: u64,
    pub dimensions: Vec<u64>,
    pub element_count: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub read_count: u64,
    pub write_count: u64,
    pub read_time: Duration,
    pub write_time: Duration,
}

impl DatasetCounters {
    /// Bytes moved by one transfer: `type_size` times the selected point
    /// count, or the whole extent when nothing narrower was selected.
    pub fn transfer_size(&self, selected_points: Option<u64>) -> u64 {
        self.type_size
            .saturating_mul(selected_points.unwrap_or(self.element_count))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DatatypeCounters {
    pub commits: u64,
    pub gets: u64,
}

/// Generic operation counter for groups and attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OpCounters {
    pub ops: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KindCounters {
    Dataset(DatasetCounters),
    Group(OpCounters),
    Datatype(DatatypeCounters),
    Attribute(OpCounters),
}

impl KindCounters {
    pub fn zeroed(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Dataset => KindCounters::Dataset(DatasetCounters::default()),
            ObjectKind::Group => KindCounters::Group(OpCounters::default()),
            ObjectKind::Datatype => KindCounters::Datatype(DatatypeCounters::default()),
            ObjectKind::Attribute => KindCounters::Attribute(OpCounters::default()),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            KindCounters::Dataset(_) => ObjectKind::Dataset,
            KindCounters::Group(_) => ObjectKind::Group,
            KindCounters::Datatype(_) => ObjectKind::Datatype,
            KindCounters::Attribute(_) => ObjectKind::Attribute,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetadataNode<T> {
    pub(crate) id: NodeId,
    pub(crate) container: ContainerId,
    pub(crate) token: T,
    pub(crate) name: Option<String>,
    pub(crate) refcount: u32,
    pub(crate) accesses: u64,
    pub(crate) counters: KindCounters,
}

impl<T> MetadataNode<T> {
    pub(crate) fn new(
        id: NodeId,
        container: ContainerId,
        kind: ObjectKind,
        token: T,
        name: Option<String>,
    ) -> Self {
        Self {
            id,
            container,
            token,
            name,
            refcount: 1,
            accesses: 1,
            counters: KindCounters::zeroed(kind),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Container this node holds a reference on.
    pub fn container(&self) -> ContainerId {
        self.container
    }

    pub fn kind(&self) -> ObjectKind {
        self.counters.kind()
    }

    pub fn token(&self) -> &T {
        &self.token
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    /// Number of `track_object` calls that resolved to this node.
    pub fn accesses(&self) -> u64 {
        self.accesses
    }

    pub fn counters(&self) -> &KindCounters {
        &self.counters
    }

    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            container: self.container,
            kind: self.kind(),
            node: self.id,
        }
    }
}
