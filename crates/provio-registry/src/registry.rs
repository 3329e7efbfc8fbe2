//! Container registry and node tracking.
//!
//! One [`Registry`] exists per execution context. It is opened by the
//! interception layer on the first intercepted open/create and closed at
//! connector termination; nothing about it is process-global.

use crate::container::Container;
use crate::error::{RegistryError, Result};
use crate::node::{KindCounters, MetadataNode, NodeHandle};
use provio_core::{ContainerId, NodeId, ObjectKind, ProvioConfig, RegistryId};
use provio_id::Identity;
use serde::Serialize;
use std::any::Any;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::time::Duration;

/// Logs and panics. Reaching one of these means the registry no longer
/// matches the caller's bookkeeping and cannot be trusted.
macro_rules! invariant_violation {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        tracing::error!(%message, "registry invariant violated");
        panic!("registry invariant violated: {message}")
    }};
}

/// A container that was still open when its registry was closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeakedContainer {
    pub id: ContainerId,
    pub name: Option<String>,
    pub refcount: u32,
    pub counts: [usize; 4],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub leaked: Vec<LeakedContainer>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.leaked.is_empty()
    }
}

pub struct Registry<I: Identity> {
    id: RegistryId,
    identity: I,
    containers: BTreeMap<ContainerId, Container<I::Token>>,
    next_node: u64,
    placeholder_name: String,
}

impl<I: Identity> Registry<I> {
    pub fn open(identity: I, config: &ProvioConfig) -> Self {
        let id = RegistryId::generate();
        tracing::debug!(registry_id = %id, "registry opened");
        Self {
            id,
            identity,
            containers: BTreeMap::new(),
            next_node: 1,
            placeholder_name: config.placeholder_container_name.clone(),
        }
    }

    /// Tear the registry down, reporting every container still open.
    pub fn close(self) -> TeardownReport {
        let leaked: Vec<LeakedContainer> = self
            .containers
            .values()
            .map(|container| {
                tracing::warn!(
                    registry_id = %self.id,
                    container_id = %container.id,
                    name = container.name.as_deref().unwrap_or("-"),
                    refcount = container.refcount,
                    "container still open at registry teardown"
                );
                LeakedContainer {
                    id: container.id,
                    name: container.name.clone(),
                    refcount: container.refcount,
                    counts: container.counts,
                }
            })
            .collect();
        tracing::debug!(registry_id = %self.id, leaked = leaked.len(), "registry closed");
        TeardownReport { leaked }
    }

    pub fn id(&self) -> RegistryId {
        self.id
    }

    pub fn identity(&self) -> &I {
        &self.identity
    }

    /// Find-or-create the container `id` and take one reference on it.
    ///
    /// Opening a placeholder left behind by adoption promotes it: the name is
    /// filled in and it becomes an ordinary container.
    pub fn open_container(
        &mut self,
        id: ContainerId,
        name: Option<&str>,
    ) -> Result<&Container<I::Token>> {
        let name = name.map(copy_name).transpose()?;
        let container = match self.containers.entry(id) {
            Entry::Vacant(vacant) => {
                tracing::debug!(container_id = %id, "container opened");
                vacant.insert(Container::new(id, name, false))
            }
            Entry::Occupied(occupied) => {
                let container = occupied.into_mut();
                if container.placeholder {
                    container.placeholder = false;
                    if name.is_some() {
                        container.name = name;
                    }
                    tracing::debug!(container_id = %id, "placeholder container promoted");
                }
                container
            }
        };
        container.refcount += 1;
        tracing::trace!(container_id = %id, refcount = container.refcount, "container referenced");
        Ok(&*container)
    }

    /// Take an extra reference on an already open container.
    pub fn pin_container(&mut self, id: ContainerId) -> Result<u32> {
        let container = self
            .containers
            .get_mut(&id)
            .ok_or(RegistryError::ContainerNotOpen(id))?;
        container.refcount += 1;
        tracing::trace!(container_id = %id, refcount = container.refcount, "container pinned");
        Ok(container.refcount)
    }

    /// Drop one reference on `id`, freeing it when none remain.
    ///
    /// Returns the remaining refcount.
    ///
    /// # Panics
    ///
    /// If `id` is not open, or if the last reference goes away while nodes
    /// are still tracked inside it.
    pub fn close_container(&mut self, id: ContainerId) -> u32 {
        let container = self.container_mut(id);
        if container.refcount == 0 {
            invariant_violation!("container {id} released with refcount 0");
        }
        container.refcount -= 1;
        if container.refcount > 0 {
            tracing::trace!(container_id = %id, refcount = container.refcount, "container released");
            return container.refcount;
        }
        if container.has_children() {
            invariant_violation!(
                "container {id} freed with open nodes {:?}",
                container.counts
            );
        }
        if let Some(container) = self.containers.remove(&id) {
            tracing::debug!(
                container_id = %id,
                attachments = container.attachments.len(),
                "container freed"
            );
        }
        0
    }

    /// Find-or-create the node for `token` inside `container` and take a
    /// reference on it.
    ///
    /// Existing nodes are matched through [`Identity::compare_identity`],
    /// most recently tracked first. A failed comparison aborts the call
    /// without touching the registry.
    pub fn track_object(
        &mut self,
        container: ContainerId,
        kind: ObjectKind,
        token: I::Token,
        name: Option<&str>,
        handle: &I::Handle,
    ) -> Result<NodeHandle> {
        let Some(entry) = self.containers.get(&container) else {
            return Err(RegistryError::ContainerNotOpen(container));
        };

        let mut existing = None;
        for node in entry.nodes(kind) {
            if self.identity.compare_identity(handle, &node.token, &token)? == Ordering::Equal {
                existing = Some(node.id);
                break;
            }
        }

        if let Some(node_id) = existing {
            let node = self.node_mut(NodeHandle { container, kind, node: node_id });
            node.refcount += 1;
            node.accesses += 1;
            tracing::trace!(
                container_id = %container,
                kind = %kind,
                node_id = %node_id,
                refcount = node.refcount,
                "node referenced"
            );
            return Ok(node.handle());
        }

        let name = name.map(copy_name).transpose()?;
        let node_id = NodeId::new(self.next_node);
        self.next_node += 1;
        let entry = self.container_mut(container);
        entry
            .list_mut(kind)
            .insert(node_id, MetadataNode::new(node_id, container, kind, token, name));
        entry.counts[kind.index()] += 1;
        entry.refcount += 1;
        tracing::debug!(
            container_id = %container,
            kind = %kind,
            node_id = %node_id,
            container_refcount = entry.refcount,
            "node created"
        );
        Ok(NodeHandle { container, kind, node: node_id })
    }

    /// [`Self::track_object`] for an object whose library-reported container
    /// may differ from the caller's.
    ///
    /// When `reported` differs from `home`, the node is tracked under
    /// `reported`: the open container with that id is reused, or a
    /// placeholder is synthesized for it. The placeholder lives exactly as
    /// long as the nodes tracked inside it.
    pub fn track_object_in(
        &mut self,
        home: ContainerId,
        reported: ContainerId,
        kind: ObjectKind,
        token: I::Token,
        name: Option<&str>,
        handle: &I::Handle,
    ) -> Result<NodeHandle> {
        if reported == home {
            return self.track_object(home, kind, token, name, handle);
        }
        let synthesized = !self.containers.contains_key(&reported);
        if synthesized {
            let placeholder = Some(copy_name(&self.placeholder_name)?);
            self.containers
                .insert(reported, Container::new(reported, placeholder, true));
            tracing::debug!(
                home_container = %home,
                container_id = %reported,
                "placeholder container synthesized"
            );
        } else {
            tracing::debug!(home_container = %home, container_id = %reported, "container adopted");
        }
        let tracked = self.track_object(reported, kind, token, name, handle);
        if tracked.is_err() && synthesized {
            self.containers.remove(&reported);
        }
        tracked
    }

    /// Drop one reference on a node, freeing it (and releasing its container
    /// reference) when none remain.
    ///
    /// Returns the node's remaining refcount.
    ///
    /// # Panics
    ///
    /// If the node or its container is not tracked.
    pub fn untrack_object(&mut self, handle: NodeHandle) -> u32 {
        let container = self.container_mut(handle.container);
        let list = container.list_mut(handle.kind);
        let Some(node) = list.get_mut(&handle.node) else {
            invariant_violation!(
                "{} node {} not tracked in container {}",
                handle.kind,
                handle.node,
                handle.container
            );
        };
        node.refcount -= 1;
        if node.refcount > 0 {
            tracing::trace!(
                container_id = %handle.container,
                kind = %handle.kind,
                node_id = %handle.node,
                refcount = node.refcount,
                "node released"
            );
            return node.refcount;
        }
        list.remove(&handle.node);
        container.counts[handle.kind.index()] -= 1;
        tracing::debug!(
            container_id = %handle.container,
            kind = %handle.kind,
            node_id = %handle.node,
            "node freed"
        );
        self.close_container(handle.container);
        0
    }

    /// Record dataset shape used to size later transfers.
    pub fn set_dataset_shape(
        &mut self,
        handle: NodeHandle,
        type_size: u64,
        dimensions: &[u64],
    ) -> Result<()> {
        let counters = self.dataset_counters(handle)?;
        let mut dims = Vec::new();
        dims.try_reserve_exact(dimensions.len())
            .map_err(|_| RegistryError::OutOfMemory { what: "dataset dimensions" })?;
        dims.extend_from_slice(dimensions);
        counters.type_size = type_size;
        counters.element_count = dimensions.iter().fold(1u64, |acc, dim| acc.saturating_mul(*dim));
        counters.dimensions = dims;
        Ok(())
    }

    /// Account one read; returns the bytes transferred.
    pub fn record_dataset_read(
        &mut self,
        handle: NodeHandle,
        selected_points: Option<u64>,
        elapsed: Duration,
    ) -> Result<u64> {
        let counters = self.dataset_counters(handle)?;
        let bytes = counters.transfer_size(selected_points);
        counters.bytes_read = counters.bytes_read.saturating_add(bytes);
        counters.read_count += 1;
        counters.read_time = counters.read_time.saturating_add(elapsed);
        Ok(bytes)
    }

    /// Account one write; returns the bytes transferred.
    pub fn record_dataset_write(
        &mut self,
        handle: NodeHandle,
        selected_points: Option<u64>,
        elapsed: Duration,
    ) -> Result<u64> {
        let counters = self.dataset_counters(handle)?;
        let bytes = counters.transfer_size(selected_points);
        counters.bytes_written = counters.bytes_written.saturating_add(bytes);
        counters.write_count += 1;
        counters.write_time = counters.write_time.saturating_add(elapsed);
        Ok(bytes)
    }

    pub fn record_datatype_commit(&mut self, handle: NodeHandle) -> Result<u64> {
        match &mut self.node_mut(handle).counters {
            KindCounters::Datatype(counters) => {
                counters.commits += 1;
                Ok(counters.commits)
            }
            other => Err(kind_mismatch(ObjectKind::Datatype, other)),
        }
    }

    pub fn record_datatype_get(&mut self, handle: NodeHandle) -> Result<u64> {
        match &mut self.node_mut(handle).counters {
            KindCounters::Datatype(counters) => {
                counters.gets += 1;
                Ok(counters.gets)
            }
            other => Err(kind_mismatch(ObjectKind::Datatype, other)),
        }
    }

    /// Count one operation on a group or attribute node.
    pub fn record_object_op(&mut self, handle: NodeHandle) -> Result<u64> {
        match &mut self.node_mut(handle).counters {
            KindCounters::Group(counters) | KindCounters::Attribute(counters) => {
                counters.ops += 1;
                Ok(counters.ops)
            }
            other => Err(RegistryError::KindMismatch {
                expected: ObjectKind::Group,
                actual: other.kind(),
            }),
        }
    }

    /// Count an object of `kind` created inside `container`.
    pub fn record_created(&mut self, container: ContainerId, kind: ObjectKind) -> Result<()> {
        let entry = self
            .containers
            .get_mut(&container)
            .ok_or(RegistryError::ContainerNotOpen(container))?;
        entry.stats.created[kind.index()] += 1;
        Ok(())
    }

    /// Count an existing object of `kind` opened inside `container`.
    pub fn record_accessed(&mut self, container: ContainerId, kind: ObjectKind) -> Result<()> {
        let entry = self
            .containers
            .get_mut(&container)
            .ok_or(RegistryError::ContainerNotOpen(container))?;
        entry.stats.accessed[kind.index()] += 1;
        Ok(())
    }

    /// Keep `resource` alive until `container` is freed.
    pub fn attach<R: Any + Send>(&mut self, container: ContainerId, resource: R) -> Result<()> {
        let entry = self
            .containers
            .get_mut(&container)
            .ok_or(RegistryError::ContainerNotOpen(container))?;
        entry
            .attachments
            .try_reserve(1)
            .map_err(|_| RegistryError::OutOfMemory { what: "container attachments" })?;
        entry.attachments.push(Box::new(resource));
        Ok(())
    }

    pub fn container(&self, id: ContainerId) -> Option<&Container<I::Token>> {
        self.containers.get(&id)
    }

    pub fn containers(&self) -> impl Iterator<Item = &Container<I::Token>> {
        self.containers.values()
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&MetadataNode<I::Token>> {
        self.containers
            .get(&handle.container)?
            .node(handle.kind, handle.node)
    }

    /// Open nodes of `kind` across every container.
    pub fn open_node_count(&self, kind: ObjectKind) -> usize {
        self.containers.values().map(|container| container.count(kind)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Check the number of open containers and dataset nodes.
    pub fn verify_open_things(&self, containers: usize, datasets: usize) -> Result<()> {
        let open_containers = self.container_count();
        let open_datasets = self.open_node_count(ObjectKind::Dataset);
        if open_containers == containers && open_datasets == datasets {
            return Ok(());
        }
        tracing::warn!(
            expected_containers = containers,
            expected_datasets = datasets,
            containers = open_containers,
            datasets = open_datasets,
            "open things mismatch"
        );
        Err(RegistryError::OpenThingsMismatch {
            expected_containers: containers,
            expected_datasets: datasets,
            containers: open_containers,
            datasets: open_datasets,
        })
    }

    /// Render every open container with its dataset nodes.
    pub fn dump_open_things(&self, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(out, "open containers: {}", self.containers.len())?;
        for container in self.containers.values() {
            write!(
                out,
                "container {} {} refcount={} datasets={} groups={} datatypes={} attributes={}",
                container.id,
                container.name.as_deref().unwrap_or("-"),
                container.refcount,
                container.count(ObjectKind::Dataset),
                container.count(ObjectKind::Group),
                container.count(ObjectKind::Datatype),
                container.count(ObjectKind::Attribute),
            )?;
            if container.placeholder {
                write!(out, " (placeholder)")?;
            }
            writeln!(out)?;
            for node in container.nodes(ObjectKind::Dataset) {
                write!(
                    out,
                    "  dataset {} {} refcount={}",
                    node.id,
                    node.name.as_deref().unwrap_or("-"),
                    node.refcount
                )?;
                if let KindCounters::Dataset(counters) = &node.counters {
                    write!(
                        out,
                        " read={}B write={}B",
                        counters.bytes_read, counters.bytes_written
                    )?;
                }
                writeln!(out)?;
            }
        }
        Ok(())
    }

    fn container_mut(&mut self, id: ContainerId) -> &mut Container<I::Token> {
        match self.containers.get_mut(&id) {
            Some(container) => container,
            None => invariant_violation!("container {id} is not tracked"),
        }
    }

    fn node_mut(&mut self, handle: NodeHandle) -> &mut MetadataNode<I::Token> {
        match self
            .container_mut(handle.container)
            .list_mut(handle.kind)
            .get_mut(&handle.node)
        {
            Some(node) => node,
            None => invariant_violation!(
                "{} node {} not tracked in container {}",
                handle.kind,
                handle.node,
                handle.container
            ),
        }
    }

    fn dataset_counters(
        &mut self,
        handle: NodeHandle,
    ) -> Result<&mut crate::node::DatasetCounters> {
        match &mut self.node_mut(handle).counters {
            KindCounters::Dataset(counters) => Ok(counters),
            other => Err(kind_mismatch(ObjectKind::Dataset, other)),
        }
    }
}

impl<I: Identity + fmt::Debug> fmt::Debug for Registry<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("containers", &self.containers.len())
            .finish()
    }
}

fn kind_mismatch(expected: ObjectKind, actual: &KindCounters) -> RegistryError {
    RegistryError::KindMismatch {
        expected,
        actual: actual.kind(),
    }
}

fn copy_name(name: &str) -> Result<String> {
    let mut owned = String::new();
    owned
        .try_reserve_exact(name.len())
        .map_err(|_| RegistryError::OutOfMemory { what: "object name" })?;
    owned.push_str(name);
    Ok(owned)
}
