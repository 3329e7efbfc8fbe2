use provio_core::{ContainerId, ObjectKind, ProvioError};
use provio_id::IdentityError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("container {0} is not open")]
    ContainerNotOpen(ContainerId),

    #[error("expected a {expected} node, got a {actual} node")]
    KindMismatch {
        expected: ObjectKind,
        actual: ObjectKind,
    },

    #[error(
        "open things mismatch: expected {expected_containers} containers and {expected_datasets} datasets, found {containers} and {datasets}"
    )]
    OpenThingsMismatch {
        expected_containers: usize,
        expected_datasets: usize,
        containers: usize,
        datasets: usize,
    },

    #[error("out of memory while allocating {what}")]
    OutOfMemory { what: &'static str },

    #[error("registry lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<RegistryError> for ProvioError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::Identity(source) => ProvioError::Identity(source.to_string()),
            RegistryError::OutOfMemory { what } => ProvioError::OutOfMemory { what },
            RegistryError::LockPoisoned => ProvioError::LockPoisoned("registry"),
            other => ProvioError::Registry(other.to_string()),
        }
    }
}
