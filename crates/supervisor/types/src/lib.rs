//! Core types shared across supervisor components.
//!
//! This crate defines the block, message and dependency-set types consumed by the
//! storage layer and by the cross-chain safety checks.

mod chain;
pub use chain::ChainIndex;

pub mod depset;
pub use depset::{ChainDependency, DependencySet, DependencySetError, StaticDependencySet};

mod derived;
pub use derived::{DependentBlock, DerivedBlockRefPair, DerivedBlockSealPair};

pub mod head;
pub use head::{ChainHeads, SafetyLevel};

mod log;
pub use log::{Log, OpenedBlock};

mod message;
pub use message::{ContainsQuery, ExecutingMessage};

mod types;
pub use types::{BlockRef, BlockSeal};

pub use alloy_eips::BlockNumHash;
