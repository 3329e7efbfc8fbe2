use crate::proxy::Proxy;
use provio_core::ProvioError;
use provio_registry::RegistryError;
use provio_stats::StatsError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterceptError {
    /// The wrapped library rejected the call.
    #[error("{op} failed in the underlying library")]
    Library {
        op: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error("failed to write stats report to {}", path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{op} expects a {expected} proxy")]
    WrongProxy {
        op: &'static str,
        expected: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, InterceptError>;

/// A close that did not happen. The proxy is handed back untouched so the
/// caller can retry; its bookkeeping is still in place.
#[derive(Debug)]
pub struct CloseError<H> {
    pub proxy: Proxy<H>,
    pub error: InterceptError,
}

impl<H> CloseError<H> {
    pub(crate) fn new(proxy: Proxy<H>, error: InterceptError) -> Self {
        Self { proxy, error }
    }

    pub fn into_parts(self) -> (Proxy<H>, InterceptError) {
        (self.proxy, self.error)
    }
}

impl<H> fmt::Display for CloseError<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "close rejected, proxy still open: {}", self.error)
    }
}

impl<H: fmt::Debug> std::error::Error for CloseError<H> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<H> From<CloseError<H>> for InterceptError {
    fn from(error: CloseError<H>) -> Self {
        error.error
    }
}

impl From<InterceptError> for ProvioError {
    fn from(error: InterceptError) -> Self {
        match error {
            InterceptError::Registry(source) => source.into(),
            InterceptError::Stats(source) => source.into(),
            other => ProvioError::Intercept(format!("{other:#}")),
        }
    }
}
