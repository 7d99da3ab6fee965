use alloy_primitives::ChainId;
use interop_supervisor_storage::StorageError;
use thiserror::Error;

/// Errors returned by an [`L2BlockSource`](crate::reorg::L2BlockSource).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlockSourceError {
    /// The source has no block at the requested height.
    #[error("block {0} not found")]
    NotFound(u64),

    /// The request to the source failed.
    #[error("block source request failed: {0}")]
    Request(String),
}

/// Error type for rewinding a chain after a reorg.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RewinderError {
    /// Indicates no block source is registered for the chain.
    #[error("block source not found for chain: {0}")]
    MissingBlockSource(ChainId),

    /// Indicates the block source failed to answer a query.
    #[error(transparent)]
    BlockSource(#[from] BlockSourceError),

    /// Indicates an error occurred while interacting with the database.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Indicates the block source registry lock was poisoned.
    #[error("lock poisoned")]
    LockPoisoned,

    /// No height between the reorged block and the finalized head agrees with the block source.
    #[error("no common ancestor with the block source on chain {chain_id}")]
    NoCommonAncestor {
        /// The reorged chain.
        chain_id: ChainId,
    },
}
