use provio_core::ProvioError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("stats table is full ({capacity} slots)")]
    CapacityExceeded { capacity: usize },
    #[error("stats table capacity must be greater than zero")]
    ZeroCapacity,
    #[error("out of memory while allocating {what}")]
    OutOfMemory { what: &'static str },
    #[error("stats lock poisoned")]
    LockPoisoned,
    #[error("failed to write stats report")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StatsError>;

impl From<StatsError> for ProvioError {
    fn from(error: StatsError) -> Self {
        match error {
            StatsError::OutOfMemory { what } => ProvioError::OutOfMemory { what },
            StatsError::LockPoisoned => ProvioError::LockPoisoned("stats"),
            StatsError::Io(source) => ProvioError::Io(source),
            other => ProvioError::Stats(other.to_string()),
        }
    }
}
