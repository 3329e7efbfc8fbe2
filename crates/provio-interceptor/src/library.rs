//! Contract with the wrapped resource-handle library.

use provio_core::{ConnectorId, ContainerId, ObjectKind};
use provio_id::Identity;
use serde::Serialize;

/// Where the library says an object lives, and its identity token.
#[derive(Debug, Clone)]
pub struct ObjectInfo<T> {
    pub container: ContainerId,
    pub token: T,
}

/// Element size and extent of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetShape {
    pub type_size: u64,
    pub dimensions: Vec<u64>,
}

/// The library whose calls are intercepted.
///
/// Token comparison comes from the [`Identity`] supertrait. Every call is
/// blocking; failures are reported as `anyhow::Error` and surface as
/// [`InterceptError::Library`](crate::InterceptError::Library).
pub trait UnderlyingLibrary: Identity {
    /// Id of the library instance servicing this connector.
    fn connector_id(&self) -> ConnectorId;

    fn create_container(&self, name: &str) -> anyhow::Result<Self::Handle>;

    fn open_container(&self, name: &str) -> anyhow::Result<Self::Handle>;

    /// Release `handle`. On failure the handle is still open and the call
    /// may be retried.
    fn close_container(&self, handle: &Self::Handle) -> anyhow::Result<()>;

    /// Stable numeric identity of the container behind `handle`.
    fn container_id(&self, handle: &Self::Handle) -> anyhow::Result<ContainerId>;

    fn create_object(
        &self,
        parent: &Self::Handle,
        kind: ObjectKind,
        name: &str,
    ) -> anyhow::Result<Self::Handle>;

    fn open_object(
        &self,
        parent: &Self::Handle,
        kind: ObjectKind,
        name: &str,
    ) -> anyhow::Result<Self::Handle>;

    fn close_object(&self, handle: &Self::Handle, kind: ObjectKind) -> anyhow::Result<()>;

    fn object_info(
        &self,
        handle: &Self::Handle,
        kind: ObjectKind,
    ) -> anyhow::Result<ObjectInfo<Self::Token>>;

    fn dataset_shape(&self, handle: &Self::Handle) -> anyhow::Result<DatasetShape>;

    /// Read `selected_points` elements, or the whole dataset when `None`.
    fn read_dataset(
        &self,
        handle: &Self::Handle,
        selected_points: Option<u64>,
    ) -> anyhow::Result<()>;

    fn write_dataset(
        &self,
        handle: &Self::Handle,
        selected_points: Option<u64>,
    ) -> anyhow::Result<()>;
}
