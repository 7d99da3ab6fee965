//! Derivation relationships between source (L1) blocks and derived (L2) blocks.

use crate::{BlockRef, BlockSeal};
use alloy_primitives::ChainId;
use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};

/// A pair of [`BlockRef`]s representing a derivation relationship between two blocks.
///
/// - `source`: The [`BlockRef`] of the source (L1) block.
/// - `derived`: The [`BlockRef`] of the derived (L2) block.
#[derive(
    Debug, Clone, Copy, Default, Display, PartialEq, Eq, Constructor, Serialize, Deserialize,
)]
#[display("source: {source}, derived: {derived}")]
pub struct DerivedBlockRefPair {
    /// The [`BlockRef`] of the source (L1) block.
    pub source: BlockRef,
    /// The [`BlockRef`] of the derived (L2) block.
    pub derived: BlockRef,
}

/// Same as [`DerivedBlockRefPair`], without parent links.
#[derive(Debug, Clone, Copy, Default, Display, PartialEq, Eq, Constructor)]
#[display("source: {source}, derived: {derived}")]
pub struct DerivedBlockSealPair {
    /// The [`BlockSeal`] of the source (L1) block.
    pub source: BlockSeal,
    /// The [`BlockSeal`] of the derived (L2) block.
    pub derived: BlockSeal,
}

impl From<DerivedBlockRefPair> for DerivedBlockSealPair {
    fn from(pair: DerivedBlockRefPair) -> Self {
        Self { source: pair.source.seal(), derived: pair.derived.seal() }
    }
}

/// A local-safe block on `chain_id` that executes a message initiated in some other block.
#[derive(Debug, Clone, Copy, Display, PartialEq, Eq, Constructor)]
#[display("chain {chain_id}: {block}")]
pub struct DependentBlock {
    /// Chain of the dependent block.
    pub chain_id: ChainId,
    /// The dependent block and the source it was derived from.
    pub block: DerivedBlockRefPair,
}
