//! Open top-level containers.

use crate::node::MetadataNode;
use provio_core::{ContainerId, NodeId, ObjectKind};
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

/// Create/access tallies kept for the provenance record of a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContainerStats {
    pub created: [u64; 4],
    pub accessed: [u64; 4],
}

impl ContainerStats {
    pub fn created(&self, kind: ObjectKind) -> u64 {
        self.created[kind.index()]
    }

    pub fn accessed(&self, kind: ObjectKind) -> u64 {
        self.accessed[kind.index()]
    }
}

/// One open container and the nodes tracked inside it.
///
/// Node lists are keyed by [`NodeId`]; ids only grow, so iterating a list in
/// reverse visits the most recently tracked node first.
pub struct Container<T> {
    pub(crate) id: ContainerId,
    pub(crate) name: Option<String>,
    pub(crate) placeholder: bool,
    pub(crate) refcount: u32,
    pub(crate) counts: [usize; 4],
    pub(crate) lists: [BTreeMap<NodeId, MetadataNode<T>>; 4],
    pub(crate) stats: ContainerStats,
    pub(crate) attachments: Vec<Box<dyn Any + Send>>,
}

impl<T> Container<T> {
    pub(crate) fn new(id: ContainerId, name: Option<String>, placeholder: bool) -> Self {
        Self {
            id,
            name,
            placeholder,
            refcount: 0,
            counts: [0; 4],
            lists: Default::default(),
            stats: ContainerStats::default(),
            attachments: Vec::new(),
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Synthesized by adoption and not yet opened through the normal path.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    /// Number of open nodes of `kind`.
    pub fn count(&self, kind: ObjectKind) -> usize {
        self.counts[kind.index()]
    }

    pub fn counts(&self) -> [usize; 4] {
        self.counts
    }

    pub fn has_children(&self) -> bool {
        self.counts.iter().any(|count| *count > 0)
    }

    /// Nodes of `kind`, most recently tracked first.
    pub fn nodes(&self, kind: ObjectKind) -> impl Iterator<Item = &MetadataNode<T>> {
        self.lists[kind.index()].values().rev()
    }

    pub fn node(&self, kind: ObjectKind, id: NodeId) -> Option<&MetadataNode<T>> {
        self.lists[kind.index()].get(&id)
    }

    pub fn stats(&self) -> &ContainerStats {
        &self.stats
    }

    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    pub(crate) fn list_mut(&mut self, kind: ObjectKind) -> &mut BTreeMap<NodeId, MetadataNode<T>> {
        &mut self.lists[kind.index()]
    }
}

impl<T> fmt::Debug for Container<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("placeholder", &self.placeholder)
            .field("refcount", &self.refcount)
            .field("counts", &self.counts)
            .field("attachments", &self.attachments.len())
            .finish()
    }
}
