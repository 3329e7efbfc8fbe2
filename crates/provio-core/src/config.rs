//! Runtime configuration for the bookkeeping core
//!
//! Provides a builder-style configuration shared by the registry, the stats
//! table and the interception layer.

use crate::error::{ProvioError, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Slot count used when no capacity is configured.
///
/// Comfortably above the ~60 intercepted operation names so probe chains
/// stay short.
pub const DEFAULT_STATS_CAPACITY: usize = 733;

/// Name given to containers synthesized for objects reached through an
/// untracked container.
pub const DEFAULT_PLACEHOLDER_NAME: &str = "dummy";

/// What the stats table does when it runs out of slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsGrowth {
    /// Never resize; inserting a new key into a full table is an error.
    #[default]
    Fixed,
    /// Double the slot array once the load factor would exceed 3/4.
    Double,
}

/// Configuration for one execution context
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProvioConfig {
    /// Number of slots in the per-operation stats table
    pub stats_capacity: usize,

    /// Resize policy of the stats table
    pub stats_growth: StatsGrowth,

    /// Where the stats report is written at teardown (None = not written)
    pub stat_file_path: Option<PathBuf>,

    /// Display name of placeholder containers created by adoption
    pub placeholder_container_name: String,

    /// Measure time spent inside the registry and the interception layer
    pub record_overhead: bool,
}

impl Default for ProvioConfig {
    fn default() -> Self {
        Self {
            stats_capacity: DEFAULT_STATS_CAPACITY,
            stats_growth: StatsGrowth::default(),
            stat_file_path: None,
            placeholder_container_name: DEFAULT_PLACEHOLDER_NAME.to_string(),
            record_overhead: true,
        }
    }
}

impl ProvioConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: ProvioConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the stats table capacity
    pub fn with_stats_capacity(mut self, capacity: usize) -> Self {
        self.stats_capacity = capacity;
        self
    }

    /// Set the stats table resize policy
    pub fn with_stats_growth(mut self, growth: StatsGrowth) -> Self {
        self.stats_growth = growth;
        self
    }

    /// Write the stats report to `path` at teardown
    pub fn with_stat_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.stat_file_path = Some(path.into());
        self
    }

    /// Set the placeholder container name
    pub fn with_placeholder_container_name(mut self, name: impl Into<String>) -> Self {
        self.placeholder_container_name = name.into();
        self
    }

    /// Enable or disable overhead measurement
    pub fn with_record_overhead(mut self, enabled: bool) -> Self {
        self.record_overhead = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.stats_capacity == 0 {
            return Err(ProvioError::Configuration(
                "stats_capacity must be greater than zero".to_string(),
            ));
        }
        if self.placeholder_container_name.is_empty() {
            return Err(ProvioError::Configuration(
                "placeholder_container_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
