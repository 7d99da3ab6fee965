//! Mocks and block builders shared by the safety checker tests.

use crate::safety_checker::{CrossSafetyError, CrossValidity};
use alloy_eips::BlockNumHash;
use alloy_primitives::{B256, ChainId};
use interop_supervisor_storage::{CrossChainSafetyProvider, StorageError};
use interop_supervisor_types::{
    BlockRef, BlockSeal, ChainDependency, ChainIndex, ContainsQuery, DependencySet,
    DependencySetError, DependentBlock, DerivedBlockRefPair, ExecutingMessage, OpenedBlock,
    StaticDependencySet,
};
use mockall::mock;

mock!(
    #[derive(Debug)]
    pub Provider {}

    impl CrossChainSafetyProvider for Provider {
        fn open_block(&self, chain_id: ChainId, block_number: u64) -> Result<OpenedBlock, StorageError>;
        fn contains(&self, chain_id: ChainId, query: &ContainsQuery) -> Result<BlockSeal, StorageError>;
        fn candidate_cross_safe(&self, chain_id: ChainId) -> Result<DerivedBlockRefPair, StorageError>;
        fn cross_safe(&self, chain_id: ChainId) -> Result<DerivedBlockRefPair, StorageError>;
        fn cross_derived_to_source(&self, chain_id: ChainId, derived: BlockNumHash) -> Result<BlockSeal, StorageError>;
        fn next_source(&self, chain_id: ChainId, source: BlockNumHash) -> Result<BlockRef, StorageError>;
        fn previous_derived(&self, chain_id: ChainId, derived: BlockNumHash) -> Result<BlockSeal, StorageError>;
        fn update_cross_safe(&self, chain_id: ChainId, source: BlockRef, derived: BlockRef) -> Result<(), StorageError>;
        fn invalidate_local_safe(&self, chain_id: ChainId, candidate: DerivedBlockRefPair) -> Result<(), StorageError>;
        fn find_dependent_blocks(&self, chain_id: ChainId, block: BlockNumHash) -> Result<Vec<DependentBlock>, StorageError>;
    }
);

mock!(
    #[derive(Debug)]
    pub Validity {}

    impl CrossValidity for Validity {
        fn is_cross_valid_block(&self, chain_id: ChainId, block: BlockSeal) -> Result<(), CrossSafetyError>;
    }
);

mock!(
    #[derive(Debug)]
    pub DepSet {}

    impl DependencySet for DepSet {
        fn chain_id_from_index(&self, index: ChainIndex) -> Result<ChainId, DependencySetError>;
        fn chain_index_from_id(&self, chain_id: ChainId) -> Result<ChainIndex, DependencySetError>;
        fn can_execute_at(&self, chain_id: ChainId, timestamp: u64) -> Result<bool, DependencySetError>;
        fn can_initiate_at(&self, chain_id: ChainId, timestamp: u64) -> Result<bool, DependencySetError>;
        fn chains(&self) -> Vec<ChainId>;
    }
);

/// Chains 900, 901 and 902 with indexes 0, 1 and 2, active from genesis.
pub(crate) fn dependency_set() -> StaticDependencySet {
    StaticDependencySet::new((0..3).map(|index| {
        (
            900 + index as ChainId,
            ChainDependency { chain_index: ChainIndex(index), activation_time: 0, history_min_time: 0 },
        )
    }))
}

pub(crate) fn block_hash(chain_id: ChainId, number: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&chain_id.to_be_bytes());
    bytes[24..].copy_from_slice(&number.to_be_bytes());
    B256::from(bytes)
}

pub(crate) fn block_ref(chain_id: ChainId, number: u64, timestamp: u64) -> BlockRef {
    BlockRef::new(
        block_hash(chain_id, number),
        number,
        block_hash(chain_id, number.saturating_sub(1)),
        timestamp,
    )
}

pub(crate) fn seal(chain_id: ChainId, number: u64, timestamp: u64) -> BlockSeal {
    block_ref(chain_id, number, timestamp).seal()
}

pub(crate) fn executing(
    chain: u32,
    block_number: u64,
    log_index: u32,
    timestamp: u64,
) -> ExecutingMessage {
    ExecutingMessage {
        chain: ChainIndex(chain),
        block_number,
        log_index,
        timestamp,
        hash: B256::with_last_byte(log_index as u8),
    }
}

pub(crate) fn opened(
    block: BlockSeal,
    log_count: u32,
    messages: &[(u32, ExecutingMessage)],
) -> OpenedBlock {
    OpenedBlock {
        block: BlockRef::new(block.hash, block.number, B256::ZERO, block.timestamp),
        log_count,
        executing_messages: messages.iter().copied().collect(),
    }
}
