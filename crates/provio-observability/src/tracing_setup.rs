//! Tracing subscriber setup for hosts embedding the interception layer.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static INIT: OnceLock<bool> = OnceLock::new();

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Install a fmt subscriber filtered by `RUST_LOG`.
///
/// Safe to call repeatedly; only the first call installs anything. Returns
/// `false` when another global subscriber was already set by the host.
pub fn init_tracing() -> bool {
    *INIT.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok()
    })
}
