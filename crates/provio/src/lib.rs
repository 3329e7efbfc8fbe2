//! PROV-IO provenance bookkeeping.
//!
//! Umbrella crate over the PROV-IO workspace: identifiers, configuration and
//! errors from `provio-core`, token identity from `provio-id`, and, behind
//! features, the stats table, the container registry, the interception layer
//! and tracing setup.

pub use provio_core::{
    ConnectorId, ContainerId, NodeId, ObjectKind, ProvioConfig, ProvioError, RegistryId, Result,
    StatsGrowth, config, error, ids,
};
pub use provio_id as identity;
pub use provio_id::{ByteIdentity, Identity, IdentityError, ObjectToken};

#[cfg(feature = "stats")]
pub use provio_stats as stats;

#[cfg(feature = "registry")]
pub use provio_registry as registry;

#[cfg(feature = "interceptor")]
pub use provio_interceptor as interceptor;

#[cfg(feature = "observability")]
pub use provio_observability as observability;

#[cfg(feature = "interceptor")]
use provio_interceptor::{ProvenanceInterceptor, UnderlyingLibrary};

/// Initialize tracing and open an interceptor for `library`, one per
/// execution context.
#[cfg(feature = "interceptor")]
pub fn connect<L: UnderlyingLibrary>(library: L, config: ProvioConfig) -> Result<ProvenanceInterceptor<L>> {
    config.validate()?;
    provio_observability::init_tracing();
    let interceptor = ProvenanceInterceptor::new(library, config)?;
    tracing::info!(registry_id = %interceptor.registry().id(), "provenance connector ready");
    Ok(interceptor)
}
