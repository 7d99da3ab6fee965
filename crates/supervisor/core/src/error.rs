//! [`SupervisorCore`](crate::SupervisorCore) errors.

use crate::{config::ConfigError, reorg::RewinderError};
use alloy_primitives::ChainId;
use interop_supervisor_storage::StorageError;
use thiserror::Error;

/// Custom error type for the supervisor core.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SupervisorError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Indicates that error occurred while interacting with the storage layer.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Indicates that the block source of a chain could not be registered.
    #[error(transparent)]
    Rewinder(#[from] RewinderError),

    /// The chain is not part of the dependency set.
    #[error("unsupported chain ID: {0}")]
    UnsupportedChainId(ChainId),

    /// The workers of the chain are already running.
    #[error("chain {0} already started")]
    AlreadyStarted(ChainId),

    /// Indicates the worker registry lock was poisoned.
    #[error("lock poisoned")]
    LockPoisoned,
}
