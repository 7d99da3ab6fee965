//! The dependency set: which chains take part in interop, and from when.

use crate::ChainIndex;
use alloy_primitives::ChainId;
use auto_impl::auto_impl;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by a [`DependencySet`] lookup.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DependencySetError {
    /// The chain id is not a member of the dependency set.
    #[error("unknown chain id {0}")]
    UnknownChain(ChainId),

    /// No member chain has the given index.
    #[error("unknown chain index {0}")]
    UnknownChainIndex(ChainIndex),
}

/// Read-only view of the chains that make up the interop federation.
///
/// Shared across every chain worker without locking.
#[auto_impl(&, Arc)]
pub trait DependencySet {
    /// Maps a chain index to its chain id.
    fn chain_id_from_index(&self, index: ChainIndex) -> Result<ChainId, DependencySetError>;

    /// Maps a chain id to its chain index.
    fn chain_index_from_id(&self, chain_id: ChainId) -> Result<ChainIndex, DependencySetError>;

    /// Returns whether `chain_id` may execute messages in a block with the given timestamp.
    fn can_execute_at(&self, chain_id: ChainId, timestamp: u64)
    -> Result<bool, DependencySetError>;

    /// Returns whether `chain_id` may initiate messages at the given timestamp.
    fn can_initiate_at(
        &self,
        chain_id: ChainId,
        timestamp: u64,
    ) -> Result<bool, DependencySetError>;

    /// Returns every member chain, ordered by chain index.
    fn chains(&self) -> Vec<ChainId>;
}

/// Configuration for a dependency of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDependency {
    /// Index of the chain inside the set.
    pub chain_index: ChainIndex,
    /// First timestamp at which the chain may execute messages.
    #[serde(default)]
    pub activation_time: u64,
    /// First timestamp at which logs of the chain may be referenced.
    #[serde(default)]
    pub history_min_time: u64,
}

/// A [`DependencySet`] fixed at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticDependencySet {
    /// Dependencies information per chain.
    pub dependencies: HashMap<ChainId, ChainDependency>,
}

impl StaticDependencySet {
    /// Creates a dependency set from `(chain_id, dependency)` pairs.
    pub fn new(dependencies: impl IntoIterator<Item = (ChainId, ChainDependency)>) -> Self {
        Self { dependencies: dependencies.into_iter().collect() }
    }

    /// Returns `true` when no two chains share an index.
    pub fn has_unique_indices(&self) -> bool {
        let mut seen: Vec<ChainIndex> =
            self.dependencies.values().map(|dep| dep.chain_index).collect();
        seen.sort_unstable();
        seen.windows(2).all(|pair| pair[0] != pair[1])
    }

    fn dependency(&self, chain_id: ChainId) -> Result<&ChainDependency, DependencySetError> {
        self.dependencies.get(&chain_id).ok_or(DependencySetError::UnknownChain(chain_id))
    }
}

impl DependencySet for StaticDependencySet {
    fn chain_id_from_index(&self, index: ChainIndex) -> Result<ChainId, DependencySetError> {
        self.dependencies
            .iter()
            .find_map(|(chain_id, dep)| (dep.chain_index == index).then_some(*chain_id))
            .ok_or(DependencySetError::UnknownChainIndex(index))
    }

    fn chain_index_from_id(&self, chain_id: ChainId) -> Result<ChainIndex, DependencySetError> {
        self.dependency(chain_id).map(|dep| dep.chain_index)
    }

    fn can_execute_at(
        &self,
        chain_id: ChainId,
        timestamp: u64,
    ) -> Result<bool, DependencySetError> {
        self.dependency(chain_id).map(|dep| timestamp >= dep.activation_time)
    }

    fn can_initiate_at(
        &self,
        chain_id: ChainId,
        timestamp: u64,
    ) -> Result<bool, DependencySetError> {
        self.dependency(chain_id).map(|dep| timestamp >= dep.history_min_time)
    }

    fn chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<(ChainIndex, ChainId)> =
            self.dependencies.iter().map(|(id, dep)| (dep.chain_index, *id)).collect();
        chains.sort_unstable();
        chains.into_iter().map(|(_, id)| id).collect()
    }
}
