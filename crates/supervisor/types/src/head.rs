//! Safety levels and per-chain heads.

use crate::BlockSeal;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Finality stage of a block, from the perspective of the whole dependency set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SafetyLevel {
    /// Sealed locally, not yet derived from any source.
    #[display("local-unsafe")]
    LocalUnsafe,
    /// Locally sealed with all cross-chain dependencies cross-unsafe.
    #[display("cross-unsafe")]
    CrossUnsafe,
    /// Derived from a source block, cross-chain dependencies unchecked.
    #[display("local-safe")]
    LocalSafe,
    /// Derived, with all cross-chain dependencies cross-safe.
    #[display("cross-safe")]
    CrossSafe,
    /// Derived from a finalized source block.
    #[display("finalized")]
    Finalized,
}

impl SafetyLevel {
    /// The four levels a reorg may rewind. Finalized history is immutable.
    pub const REWINDABLE: [Self; 4] =
        [Self::LocalUnsafe, Self::CrossUnsafe, Self::LocalSafe, Self::CrossSafe];
}

/// Snapshot of the heads of a single chain.
///
/// Heads that have not been established yet are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainHeads {
    /// Latest locally sealed block.
    pub local_unsafe: Option<BlockSeal>,
    /// Cross-unsafe head.
    pub cross_unsafe: Option<BlockSeal>,
    /// Local-safe head.
    pub local_safe: Option<BlockSeal>,
    /// Cross-safe head.
    pub cross_safe: Option<BlockSeal>,
    /// Finalized head.
    pub finalized: Option<BlockSeal>,
}

impl ChainHeads {
    /// Returns the head tracked for `level`.
    pub const fn get(&self, level: SafetyLevel) -> Option<BlockSeal> {
        match level {
            SafetyLevel::LocalUnsafe => self.local_unsafe,
            SafetyLevel::CrossUnsafe => self.cross_unsafe,
            SafetyLevel::LocalSafe => self.local_safe,
            SafetyLevel::CrossSafe => self.cross_safe,
            SafetyLevel::Finalized => self.finalized,
        }
    }
}
