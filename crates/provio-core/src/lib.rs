//! PROV-IO core types and shared utilities.

pub mod config;
pub mod error;
pub mod ids;

pub use config::{ProvioConfig, StatsGrowth};
pub use error::{ProvioError, Result};
pub use ids::{ConnectorId, ContainerId, NodeId, ObjectKind, RegistryId};
