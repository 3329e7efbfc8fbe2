//! Wrapper objects handed to callers in place of raw library handles.

use provio_core::{ConnectorId, ContainerId};
use provio_registry::NodeHandle;

/// Bookkeeping entry a proxy points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyTarget {
    Container(ContainerId),
    Object(NodeHandle),
}

/// A raw library handle paired with its registry entry.
///
/// Fake proxies carry no handle; they only ferry a container and connector
/// into the wrap routine and never leave this crate.
#[derive(Debug)]
pub struct Proxy<H> {
    handle: Option<H>,
    connector: ConnectorId,
    target: ProxyTarget,
}

impl<H> Proxy<H> {
    pub(crate) fn container(handle: H, connector: ConnectorId, container: ContainerId) -> Self {
        Self {
            handle: Some(handle),
            connector,
            target: ProxyTarget::Container(container),
        }
    }

    pub(crate) fn object(handle: H, connector: ConnectorId, node: NodeHandle) -> Self {
        Self {
            handle: Some(handle),
            connector,
            target: ProxyTarget::Object(node),
        }
    }

    pub(crate) fn fake(connector: ConnectorId, container: ContainerId) -> Self {
        Self {
            handle: None,
            connector,
            target: ProxyTarget::Container(container),
        }
    }

    pub fn handle(&self) -> Option<&H> {
        self.handle.as_ref()
    }

    pub(crate) fn into_handle(self) -> Option<H> {
        self.handle
    }

    pub fn connector(&self) -> ConnectorId {
        self.connector
    }

    pub fn target(&self) -> ProxyTarget {
        self.target
    }

    pub fn is_fake(&self) -> bool {
        self.handle.is_none()
    }

    /// Container this proxy's bookkeeping lives in.
    pub fn container_id(&self) -> ContainerId {
        match self.target {
            ProxyTarget::Container(id) => id,
            ProxyTarget::Object(node) => node.container,
        }
    }

    pub fn node(&self) -> Option<NodeHandle> {
        match self.target {
            ProxyTarget::Object(node) => Some(node),
            ProxyTarget::Container(_) => None,
        }
    }
}

/// Pinned container used to wrap objects outside a normal open/create call.
///
/// Holds one reference on the container until passed to
/// [`ProvenanceInterceptor::free_wrap_ctx`](crate::ProvenanceInterceptor::free_wrap_ctx).
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a wrap context pins its container until freed"]
pub struct WrapContext {
    pub(crate) connector: ConnectorId,
    pub(crate) container: ContainerId,
}

impl WrapContext {
    pub fn connector(&self) -> ConnectorId {
        self.connector
    }

    pub fn container(&self) -> ContainerId {
        self.container
    }
}
