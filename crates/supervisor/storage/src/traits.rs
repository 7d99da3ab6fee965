use crate::StorageError;
use alloy_eips::BlockNumHash;
use alloy_primitives::ChainId;
use interop_supervisor_types::{
    BlockRef, BlockSeal, ChainHeads, ContainsQuery, DependentBlock, DerivedBlockRefPair, Log,
    OpenedBlock, SafetyLevel,
};
use std::fmt::Debug;

/// Provides read access to the sealed blocks and logs of one chain.
///
/// Implementations are expected to provide thread-safe access to block logs.
pub trait LogStorageReader: Debug {
    /// Returns the sealed block at `block_number` with its log count and executing messages.
    ///
    /// # Returns
    /// * `Ok(OpenedBlock)` if the block is sealed.
    /// * `Err(StorageError::FutureData)` if the block is above the latest sealed block.
    /// * `Err(StorageError)` if the block is otherwise unknown.
    fn open_block(&self, block_number: u64) -> Result<OpenedBlock, StorageError>;

    /// Returns the [`BlockSeal`] of the sealed block at `block_number`.
    fn find_sealed_block(&self, block_number: u64) -> Result<BlockSeal, StorageError>;

    /// Returns the latest sealed block.
    fn latest_sealed_block(&self) -> Result<BlockSeal, StorageError>;

    /// Resolves an initiating log and returns the block that contains it.
    ///
    /// # Returns
    /// * `Ok(BlockSeal)` if the log exists with the queried hash in a block with the queried
    ///   timestamp.
    /// * `Err(StorageError::FutureData)` if the block has not been sealed yet.
    /// * `Err(StorageError::ConflictError)` if the log is missing or differs.
    fn contains(&self, query: &ContainsQuery) -> Result<BlockSeal, StorageError>;
}

/// Provides an interface for storing blocks and the logs associated with them.
pub trait LogStorageWriter: Send + Sync + Debug {
    /// Seals `block` and appends its `logs`.
    ///
    /// The block must be the child of the latest sealed block. Sealing the same block twice is a
    /// no-op, sealing a different block at a sealed height is a conflict.
    fn seal_block(&self, block: BlockRef, logs: &[Log]) -> Result<(), StorageError>;
}

/// Combines both reading and writing capabilities for log storage.
pub trait LogStorage: LogStorageReader + LogStorageWriter {}

impl<T: LogStorageReader + LogStorageWriter> LogStorage for T {}

/// Read access to the derivation records of one chain.
pub trait DerivationStorageReader: Debug {
    /// Latest local-safe pair.
    fn local_safe(&self) -> Result<DerivedBlockRefPair, StorageError>;

    /// Current cross-safe pair. The source is the L1 scope the derived block was last checked
    /// against.
    fn cross_safe(&self) -> Result<DerivedBlockRefPair, StorageError>;

    /// The next local-safe block to check for cross-safety, paired with the scope to check it in.
    ///
    /// # Returns
    /// * `Err(StorageError::AwaitingReplacement)` while an invalidated block has not been
    ///   replaced.
    /// * `Err(StorageError::FutureData)` if every local-safe block is already cross-safe.
    fn candidate_cross_safe(&self) -> Result<DerivedBlockRefPair, StorageError>;

    /// Returns the source block at which `derived` first became cross-safe.
    fn cross_derived_to_source(&self, derived: BlockNumHash) -> Result<BlockSeal, StorageError>;

    /// Returns the source block that follows `source`.
    fn next_source(&self, source: BlockNumHash) -> Result<BlockRef, StorageError>;

    /// Returns the local-safe block preceding `derived`.
    fn previous_derived(&self, derived: BlockNumHash) -> Result<BlockSeal, StorageError>;
}

/// Write access to the derivation records of one chain.
pub trait DerivationStorageWriter: Debug {
    /// Anchors the chain at `anchor`, which becomes local-safe and cross-safe at once.
    fn initialise(&self, anchor: DerivedBlockRefPair) -> Result<(), StorageError>;

    /// Records an observed source block. Idempotent.
    fn save_source_block(&self, source: BlockRef) -> Result<(), StorageError>;

    /// Records a newly derived local-safe block.
    ///
    /// This method is append-only: an identical pair is ignored, a differing pair at a known
    /// height is a conflict.
    fn save_derived_block(&self, pair: DerivedBlockRefPair) -> Result<(), StorageError>;

    /// Moves the cross-safe head to `derived`, checked in scope `source`.
    ///
    /// `derived` is either the child of the current cross-safe block, or the current cross-safe
    /// block itself with a wider scope.
    fn update_cross_safe(&self, source: BlockRef, derived: BlockRef) -> Result<(), StorageError>;

    /// Drops `candidate` and everything after it from local-safe and local-unsafe storage.
    ///
    /// Until a different block is derived at the candidate's height,
    /// [`DerivationStorageReader::candidate_cross_safe`] fails with
    /// [`StorageError::AwaitingReplacement`].
    fn invalidate_local_safe(&self, candidate: DerivedBlockRefPair) -> Result<(), StorageError>;
}

/// Combines both reading and writing capabilities for derivation storage.
pub trait DerivationStorage: DerivationStorageReader + DerivationStorageWriter {}

impl<T: DerivationStorageReader + DerivationStorageWriter> DerivationStorage for T {}

/// Read access to the safety heads of one chain.
pub trait HeadRefStorageReader: Debug {
    /// Retrieves the head at `level`.
    ///
    /// # Returns
    /// * `Err(StorageError::EntryNotFound)` if no head has been established for `level`.
    fn get_safety_head(&self, level: SafetyLevel) -> Result<BlockSeal, StorageError>;

    /// Snapshot of every head.
    fn heads(&self) -> Result<ChainHeads, StorageError>;
}

/// Write access to the safety heads of one chain.
pub trait HeadRefStorageWriter: Debug {
    /// Updates the cross-unsafe head. The block must still be sealed.
    fn update_cross_unsafe(&self, block: BlockSeal) -> Result<(), StorageError>;

    /// Updates the finalized head. The block must be cross-safe.
    fn update_finalized(&self, block: BlockSeal) -> Result<(), StorageError>;
}

/// Combines both reading and writing capabilities for safety head storage.
pub trait HeadRefStorage: HeadRefStorageReader + HeadRefStorageWriter {}

impl<T: HeadRefStorageReader + HeadRefStorageWriter> HeadRefStorage for T {}

/// Rewinds individual safety levels of one chain.
///
/// Each method keeps `to` and drops everything above it. Rewinding below the finalized head fails
/// with [`StorageError::RewindBeyondFinalized`].
pub trait StorageRewinder {
    /// Rewinds sealed blocks and their logs.
    fn rewind_local_unsafe(&self, to: BlockNumHash) -> Result<(), StorageError>;

    /// Rewinds the cross-unsafe head.
    fn rewind_cross_unsafe(&self, to: BlockNumHash) -> Result<(), StorageError>;

    /// Rewinds local-safe derivation records.
    fn rewind_local_safe(&self, to: BlockNumHash) -> Result<(), StorageError>;

    /// Rewinds cross-safe derivation records.
    fn rewind_cross_safe(&self, to: BlockNumHash) -> Result<(), StorageError>;
}

/// Combines the reader traits for the database.
pub trait DbReader: DerivationStorageReader + HeadRefStorageReader + LogStorageReader {}

impl<T: DerivationStorageReader + HeadRefStorageReader + LogStorageReader> DbReader for T {}

/// Provides block, log and derivation access across every chain of the dependency set.
///
/// This is what the cross-safe checks consume: every method is keyed by chain.
pub trait CrossChainSafetyProvider {
    /// See [`LogStorageReader::open_block`].
    fn open_block(&self, chain_id: ChainId, block_number: u64)
    -> Result<OpenedBlock, StorageError>;

    /// See [`LogStorageReader::contains`].
    fn contains(&self, chain_id: ChainId, query: &ContainsQuery)
    -> Result<BlockSeal, StorageError>;

    /// See [`DerivationStorageReader::candidate_cross_safe`].
    fn candidate_cross_safe(&self, chain_id: ChainId)
    -> Result<DerivedBlockRefPair, StorageError>;

    /// See [`DerivationStorageReader::cross_safe`].
    fn cross_safe(&self, chain_id: ChainId) -> Result<DerivedBlockRefPair, StorageError>;

    /// See [`DerivationStorageReader::cross_derived_to_source`].
    fn cross_derived_to_source(
        &self,
        chain_id: ChainId,
        derived: BlockNumHash,
    ) -> Result<BlockSeal, StorageError>;

    /// See [`DerivationStorageReader::next_source`].
    fn next_source(&self, chain_id: ChainId, source: BlockNumHash)
    -> Result<BlockRef, StorageError>;

    /// See [`DerivationStorageReader::previous_derived`].
    fn previous_derived(
        &self,
        chain_id: ChainId,
        derived: BlockNumHash,
    ) -> Result<BlockSeal, StorageError>;

    /// See [`DerivationStorageWriter::update_cross_safe`].
    fn update_cross_safe(
        &self,
        chain_id: ChainId,
        source: BlockRef,
        derived: BlockRef,
    ) -> Result<(), StorageError>;

    /// See [`DerivationStorageWriter::invalidate_local_safe`].
    fn invalidate_local_safe(
        &self,
        chain_id: ChainId,
        candidate: DerivedBlockRefPair,
    ) -> Result<(), StorageError>;

    /// Finds, per other chain, the lowest local-safe block that is not cross-safe yet and
    /// executes a message initiated in `block` of `chain_id`.
    fn find_dependent_blocks(
        &self,
        chain_id: ChainId,
        block: BlockNumHash,
    ) -> Result<Vec<DependentBlock>, StorageError>;
}
