use alloy_eips::BlockNumHash;
use alloy_primitives::ChainId;
use interop_supervisor_types::SafetyLevel;
use thiserror::Error;

/// Errors that may occur while interacting with supervisor storage.
///
/// This enum is used across the log database, the per-chain state store and the factory.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading, writing or truncating a database file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A state record could not be encoded.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Represents an error that occurred while acquiring a lock.
    #[error("lock poisoned")]
    LockPoisoned,

    /// The expected entry was not found in the database.
    #[error(transparent)]
    EntryNotFound(#[from] EntryNotFoundError),

    /// Represents an error that occurred while getting data that is not yet available.
    #[error("data not yet available")]
    FutureData,

    /// The chain is not a member of the dependency set.
    #[error("chain {0} is not part of the dependency set")]
    UnknownChain(ChainId),

    /// Represents an error that occurred when database is not initialized.
    #[error("database not initialized")]
    DatabaseNotInitialised,

    /// Stored data disagrees with the data being queried or written.
    #[error("conflicting data")]
    ConflictError,

    /// A log was appended out of order.
    #[error("log out of order: {0}")]
    LogOutOfOrder(String),

    /// An unexpected record was found at a known offset. The database needs manual recovery.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Represents an error that occurred while sealing a block.
    #[error("latest stored block is not parent of the incoming block")]
    BlockOutOfOrder,

    /// The local-safe candidate was invalidated and no replacement has been derived yet.
    #[error("awaiting replacement of invalidated block {}", .0.number)]
    AwaitingReplacement(BlockNumHash),

    /// Represents an error that occurred when attempting to rewind beyond the finalized head.
    #[error("rewinding beyond finalized head. to: {to}, finalized: {finalized}")]
    RewindBeyondFinalized {
        /// The target block number to rewind to.
        to: u64,
        /// The finalized block number.
        finalized: u64,
    },
}

impl PartialEq for StorageError {
    fn eq(&self, other: &Self) -> bool {
        use StorageError::*;
        match (self, other) {
            (Io(a), Io(b)) => a.kind() == b.kind(),
            (Serialization(a), Serialization(b)) => a.to_string() == b.to_string(),
            (EntryNotFound(a), EntryNotFound(b)) => a == b,
            (LogOutOfOrder(a), LogOutOfOrder(b)) | (DataCorruption(a), DataCorruption(b)) => a == b,
            (AwaitingReplacement(a), AwaitingReplacement(b)) => a == b,
            (UnknownChain(a), UnknownChain(b)) => a == b,
            (
                RewindBeyondFinalized { to: a, finalized: fa },
                RewindBeyondFinalized { to: b, finalized: fb },
            ) => a == b && fa == fb,
            (LockPoisoned, LockPoisoned) |
            (FutureData, FutureData) |
            (DatabaseNotInitialised, DatabaseNotInitialised) |
            (ConflictError, ConflictError) |
            (BlockOutOfOrder, BlockOutOfOrder) => true,
            _ => false,
        }
    }
}

impl Eq for StorageError {}

/// Entry not found error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntryNotFoundError {
    /// Expected source block not found.
    #[error("source block not found, number: {0}")]
    SourceBlockNotFound(u64),

    /// Expected derived block not found.
    #[error("derived block not found, number: {0}")]
    DerivedBlockNotFound(u64),

    /// No block has been sealed at the given height.
    #[error("sealed block not found, number: {0}")]
    SealedBlockNotFound(u64),

    /// No search checkpoint exists at or before the requested block.
    #[error("no checkpoint at or before block {0}")]
    CheckpointNotFound(u64),

    /// The requested safety head has not been established yet.
    #[error("{0} head not set")]
    HeadNotSet(SafetyLevel),
}
