//! Configuration of the supervisor core.

use crate::safety_checker::MAX_HAZARD_BLOCK_CHECKS;
use derive_more::Constructor;
use interop_supervisor_types::StaticDependencySet;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

/// Errors reported by [`Config::validate`].
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No chains are configured for supervision.
    #[error("empty dependency set")]
    EmptyDependencySet,

    /// Two chains of the dependency set share a chain index.
    #[error("duplicate chain index in dependency set")]
    DuplicateChainIndex,

    /// The cross-safe retry interval is zero.
    #[error("cross-safe interval must be non-zero")]
    ZeroInterval,

    /// The per-chain event channel has no capacity.
    #[error("event channel capacity must be non-zero")]
    ZeroChannelCapacity,

    /// The hazard check limit is zero.
    #[error("max hazard block checks must be non-zero")]
    ZeroHazardLimit,
}

/// Configuration for the supervisor core.
#[derive(Debug, Clone, Constructor, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory where the per-chain log databases are stored.
    pub datadir: PathBuf,

    /// The chains taking part in interop.
    pub dependency_set: StaticDependencySet,

    /// Seconds between two cross-safe promotion attempts of a chain.
    pub cross_safe_interval: u64,

    /// Capacity of every chain's event channel.
    pub event_channel_capacity: usize,

    /// Upper bound on the blocks visited while building one hazard set.
    #[serde(default = "default_max_hazard_block_checks")]
    pub max_hazard_block_checks: usize,

    /// Whether to record metrics.
    #[serde(default)]
    pub metrics_enabled: bool,
}

const fn default_max_hazard_block_checks() -> usize {
    MAX_HAZARD_BLOCK_CHECKS
}

impl Config {
    /// Checks the configuration for values the core cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dependency_set.dependencies.is_empty() {
            return Err(ConfigError::EmptyDependencySet);
        }
        if !self.dependency_set.has_unique_indices() {
            return Err(ConfigError::DuplicateChainIndex);
        }
        if self.cross_safe_interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::ZeroChannelCapacity);
        }
        if self.max_hazard_block_checks == 0 {
            return Err(ConfigError::ZeroHazardLimit);
        }
        Ok(())
    }

    /// Interval between two cross-safe promotion attempts of a chain.
    pub const fn cross_safe_interval(&self) -> Duration {
        Duration::from_secs(self.cross_safe_interval)
    }
}
