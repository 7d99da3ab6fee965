use alloy_primitives::ChainId;
use interop_supervisor_storage::StorageError;
use interop_supervisor_types::{BlockSeal, ChainIndex, DependencySetError};
use thiserror::Error;

/// Errors returned while checking and promoting a cross-safe candidate.
///
/// The promoter turns each class into an action: [`Self::is_future`] errors are retried on the
/// next request, [`Self::is_out_of_scope`] errors widen the source scope and
/// [`Self::is_conflict`] errors invalidate the candidate.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum CrossSafetyError {
    /// Indicates a failure while accessing storage during dependency checking.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The candidate breaks an invariant and has to be invalidated.
    #[error(transparent)]
    Conflict(#[from] ValidationError),

    /// A block the candidate depends on has not reached the required safety level yet.
    #[error("block {block_number} of chain {chain_id} is not cross-safe yet")]
    Future {
        /// Chain of the pending block.
        chain_id: ChainId,
        /// Number of the pending block.
        block_number: u64,
    },

    /// A block the candidate depends on was derived from a source block beyond the scope.
    #[error(
        "block {block_number} of chain {chain_id} derived from source {source_number}, beyond scope {scope_number}"
    )]
    OutOfScope {
        /// Chain of the dependency.
        chain_id: ChainId,
        /// Number of the dependency.
        block_number: u64,
        /// Source block the dependency was derived from.
        source_number: u64,
        /// Source block the candidate is checked in.
        scope_number: u64,
    },

    /// Building the hazard set touched more blocks than allowed.
    #[error("exceeded maximum of {0} hazard block checks")]
    HazardLimitExceeded(usize),

    /// The dependency set could not answer an activation query.
    #[error(transparent)]
    DependencySet(#[from] DependencySetError),
}

impl CrossSafetyError {
    /// Returns `true` if the referenced data does not exist yet and the check should be retried.
    pub const fn is_future(&self) -> bool {
        matches!(self, Self::Future { .. } | Self::Storage(StorageError::FutureData))
    }

    /// Returns `true` if the candidate cannot be decided within the current source scope.
    pub const fn is_out_of_scope(&self) -> bool {
        matches!(self, Self::OutOfScope { .. })
    }

    /// Returns `true` if the candidate is invalid.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Storage(StorageError::ConflictError))
    }

    /// Returns `true` if the chain waits for an invalidated block to be replaced.
    pub const fn is_awaiting_replacement(&self) -> bool {
        matches!(self, Self::Storage(StorageError::AwaitingReplacement(_)))
    }

    /// Classifies a failed chain index lookup for a message.
    ///
    /// Only an index outside the dependency set invalidates the message.
    pub(crate) const fn from_index_lookup(err: DependencySetError) -> Self {
        match err {
            DependencySetError::UnknownChainIndex(index) => {
                Self::Conflict(ValidationError::UnknownChain(index))
            }
            other => Self::DependencySet(other),
        }
    }
}

/// Errors returned when block validation fails due to a fatal violation.
/// These errors indicate that the block must be invalidated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The logs of the hazard blocks at one timestamp depend on each other in a cycle.
    #[error("cyclic dependency among hazard blocks at timestamp {timestamp}")]
    Cycle {
        /// Timestamp of the examined hazard blocks.
        timestamp: u64,
    },

    /// An executing message references its own log.
    #[error("executing message at log {log_index} of chain {chain} references itself")]
    SelfReferencing {
        /// Chain of the message.
        chain: ChainIndex,
        /// Position of the message.
        log_index: u32,
    },

    /// An executing message references a chain outside the dependency set or the hazard set.
    #[error("executing message references unknown chain {0}")]
    UnknownChain(ChainIndex),

    /// An executing message sits at, or references, a log index beyond the block's log count.
    #[error("log index {log_index} of chain {chain} is beyond log count {log_count}")]
    InvalidLogIndex {
        /// Chain of the block.
        chain: ChainIndex,
        /// The offending log index.
        log_index: u32,
        /// Number of logs in the block.
        log_count: u32,
    },

    /// An executing message is newer than the block that executes it.
    #[error(
        "executing message with timestamp {message_timestamp} in block {block} breaks timestamp invariant"
    )]
    TimestampInvariant {
        /// The executing block.
        block: BlockSeal,
        /// Timestamp of the initiating message.
        message_timestamp: u64,
    },

    /// The stored block differs from the block under check.
    #[error("expected block {expected}, but storage has {found}")]
    BlockMismatch {
        /// Block under check.
        expected: BlockSeal,
        /// Block found in storage.
        found: BlockSeal,
    },

    /// Two different blocks of one chain were found as same-timestamp dependencies.
    #[error("found dependency on {found} of chain {chain}, but already depend on {existing}")]
    HazardConflict {
        /// Chain of both blocks.
        chain: ChainIndex,
        /// Block already in the hazard set.
        existing: BlockSeal,
        /// Newly found block.
        found: BlockSeal,
    },

    /// The chain may not execute messages at the block's timestamp.
    #[error("chain {chain_id} cannot execute messages at timestamp {timestamp}")]
    ExecutionNotPermitted {
        /// The executing chain.
        chain_id: ChainId,
        /// Timestamp of the executing block.
        timestamp: u64,
    },

    /// The chain may not initiate messages at the message's timestamp.
    #[error("chain {chain_id} cannot initiate messages at timestamp {timestamp}")]
    InitiationNotPermitted {
        /// The initiating chain.
        chain_id: ChainId,
        /// Timestamp of the initiating message.
        timestamp: u64,
    },

    /// A jointly promoted block depends on a block missing from the hazard set.
    #[error("deferred promotion dependency {block_number} of chain {chain} not in hazard set")]
    MissingDependency {
        /// Chain of the missing block.
        chain: ChainIndex,
        /// Number of the missing block.
        block_number: u64,
    },
}
