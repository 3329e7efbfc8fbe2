//! Reference-counted registry of open containers and their metadata nodes.
//!
//! A [`Registry`] owns every open [`Container`]; each container owns one node
//! list per [`ObjectKind`](provio_core::ObjectKind). Nodes are deduplicated by
//! library token through the injected [`Identity`](provio_id::Identity), and
//! every live node holds one reference on its container, so a container can
//! only be freed once all of its children are gone.

pub mod container;
pub mod error;
pub mod node;
pub mod registry;
pub mod shared;

pub use container::{Container, ContainerStats};
pub use error::{RegistryError, Result};
pub use node::{DatasetCounters, DatatypeCounters, KindCounters, MetadataNode, NodeHandle, OpCounters};
pub use registry::{LeakedContainer, Registry, TeardownReport};
pub use shared::SharedRegistry;
