//! Span constructors shared by the interception layer.

use provio_core::{ContainerId, ObjectKind, RegistryId};
use tracing::Span;

/// Span around one intercepted library operation.
#[inline]
pub fn intercepted_op(op: &'static str, kind: Option<ObjectKind>) -> Span {
    match kind {
        Some(kind) => tracing::debug_span!("intercepted_op", op, kind = kind.as_str()),
        None => tracing::debug_span!("intercepted_op", op),
    }
}

/// Span around bookkeeping for one container.
#[inline]
pub fn container_scope(container: ContainerId) -> Span {
    tracing::trace_span!("container", container_id = container.get())
}

#[inline]
pub fn registry_teardown(registry: RegistryId) -> Span {
    tracing::info_span!("registry_teardown", registry_id = %registry)
}

#[inline]
pub fn stats_report(entries: usize) -> Span {
    tracing::debug_span!("stats_report", entries)
}
