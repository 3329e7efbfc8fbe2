//! Error types shared across the PROV-IO crates
//!
//! Each crate owns a narrower error enum; this is the umbrella type hosts see
//! when they drive the whole stack through the `provio` crate.

use thiserror::Error;

/// Main error type for the provenance bookkeeping core
#[derive(Error, Debug)]
pub enum ProvioError {
    /// Identity comparison against the wrapped library failed
    #[error("identity comparison failed: {0}")]
    Identity(String),

    /// Stats table error
    #[error("stats error: {0}")]
    Stats(String),

    /// Registry error
    #[error("registry error: {0}")]
    Registry(String),

    /// Interception layer error
    #[error("interception error: {0}")]
    Intercept(String),

    /// Storage for bookkeeping metadata could not be allocated
    #[error("out of memory while allocating {what}")]
    OutOfMemory { what: &'static str },

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O error (report files, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Shared registry or stats lock poisoned
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ProvioError>;
