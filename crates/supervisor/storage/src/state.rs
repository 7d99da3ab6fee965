//! In-memory indexes of one chain and the records that change them.
//!
//! Every change goes through [`ChainState::apply`], both when it is first made and when the
//! journal is replayed on open. Validation happens before a record is built, so applying one
//! never fails.

use crate::{EntryNotFoundError, StorageError};
use alloy_eips::BlockNumHash;
use interop_supervisor_types::{
    BlockRef, BlockSeal, DerivedBlockRefPair, ExecutingMessage, OpenedBlock,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SealedBlock {
    pub(crate) block: BlockRef,
    pub(crate) log_count: u32,
    pub(crate) executing_messages: BTreeMap<u32, ExecutingMessage>,
}

impl SealedBlock {
    pub(crate) const fn empty(block: BlockRef) -> Self {
        Self { block, log_count: 0, executing_messages: BTreeMap::new() }
    }

    pub(crate) fn opened(&self) -> OpenedBlock {
        OpenedBlock {
            block: self.block,
            log_count: self.log_count,
            executing_messages: self.executing_messages.clone(),
        }
    }
}

/// Block indexes of one chain. Derivation maps are keyed by derived block number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChainState {
    pub(crate) blocks: BTreeMap<u64, SealedBlock>,
    pub(crate) sources: BTreeMap<u64, BlockRef>,
    pub(crate) local_derived: BTreeMap<u64, DerivedBlockRefPair>,
    /// First scope each block became cross-safe in.
    pub(crate) cross_derived: BTreeMap<u64, DerivedBlockRefPair>,
    pub(crate) cross_safe: Option<DerivedBlockRefPair>,
    pub(crate) cross_unsafe: Option<BlockSeal>,
    pub(crate) finalized: Option<BlockSeal>,
    /// Local-safe block dropped by an invalidation and not replaced yet.
    pub(crate) invalidated: Option<BlockSeal>,
}

/// A validated change to a [`ChainState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum StateRecord {
    /// Replaces the whole state. Written when the journal is compacted.
    Snapshot(Box<ChainState>),
    SealBlock(SealedBlock),
    SaveSource(BlockRef),
    Initialise(DerivedBlockRefPair),
    SaveDerived(DerivedBlockRefPair),
    UpdateCrossSafe(DerivedBlockRefPair),
    /// Drops the given local-safe block and everything built on it.
    InvalidateLocalSafe(BlockRef),
    UpdateCrossUnsafe(BlockSeal),
    UpdateFinalized(BlockSeal),
    RewindLocalUnsafe { number: u64 },
    RewindCrossUnsafe(BlockSeal),
    RewindLocalSafe { number: u64 },
    RewindCrossSafe { number: u64 },
}

impl ChainState {
    pub(crate) fn latest_block(&self) -> Option<&SealedBlock> {
        self.blocks.last_key_value().map(|(_, block)| block)
    }

    pub(crate) fn check_above_finalized(&self, to: u64) -> Result<(), StorageError> {
        match self.finalized {
            Some(finalized) if to < finalized.number => Err(StorageError::RewindBeyondFinalized {
                to,
                finalized: finalized.number,
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn sealed(&self, block: BlockNumHash) -> Result<&SealedBlock, StorageError> {
        let sealed = self
            .blocks
            .get(&block.number)
            .ok_or(EntryNotFoundError::SealedBlockNotFound(block.number))?;
        if sealed.block.hash != block.hash {
            return Err(StorageError::ConflictError);
        }
        Ok(sealed)
    }

    /// Checks that `source` can be recorded. Returns `false` if it already is.
    pub(crate) fn check_source(&self, source: &BlockRef) -> Result<bool, StorageError> {
        if let Some(existing) = self.sources.get(&source.number) {
            if existing == source {
                return Ok(false);
            }
            return Err(StorageError::ConflictError);
        }
        if let Some((_, last)) = self.sources.last_key_value() {
            if source.number != last.number + 1 || source.parent_hash != last.hash {
                return Err(StorageError::BlockOutOfOrder);
            }
        }
        Ok(true)
    }

    /// Position of the last log indexed by a sealed block, if any block has logs.
    pub(crate) fn last_indexed_log(&self) -> Option<(u64, u32)> {
        self.blocks
            .values()
            .rev()
            .find(|sealed| sealed.log_count > 0)
            .map(|sealed| (sealed.block.number, sealed.log_count - 1))
    }

    /// Records the state as a single snapshot record.
    pub(crate) fn snapshot(&self) -> StateRecord {
        StateRecord::Snapshot(Box::new(self.clone()))
    }

    pub(crate) fn apply(&mut self, record: &StateRecord) {
        match record {
            StateRecord::Snapshot(state) => *self = (**state).clone(),
            StateRecord::SealBlock(sealed) => {
                self.blocks.insert(sealed.block.number, sealed.clone());
            }
            StateRecord::SaveSource(source) => {
                self.sources.insert(source.number, *source);
            }
            StateRecord::Initialise(anchor) => {
                self.blocks
                    .entry(anchor.derived.number)
                    .or_insert_with(|| SealedBlock::empty(anchor.derived));
                self.sources.entry(anchor.source.number).or_insert(anchor.source);
                self.local_derived.entry(anchor.derived.number).or_insert(*anchor);
                self.cross_derived.insert(anchor.derived.number, *anchor);
                self.cross_safe = Some(*anchor);
                self.cross_unsafe.get_or_insert(anchor.derived.seal());
            }
            StateRecord::SaveDerived(pair) => {
                self.sources.entry(pair.source.number).or_insert(pair.source);
                let replaced = self
                    .invalidated
                    .is_some_and(|invalidated| invalidated.number == pair.derived.number);
                if replaced {
                    self.invalidated = None;
                }
                self.local_derived.insert(pair.derived.number, *pair);
            }
            StateRecord::UpdateCrossSafe(pair) => {
                self.cross_derived.entry(pair.derived.number).or_insert(*pair);
                self.cross_safe = Some(*pair);
            }
            StateRecord::InvalidateLocalSafe(derived) => {
                let number = derived.number;
                if number > 0 && self.blocks.contains_key(&number) {
                    self.truncate_blocks(number - 1);
                }
                self.truncate_local_safe(number);
                self.invalidated = Some(derived.seal());
            }
            StateRecord::UpdateCrossUnsafe(block) => self.cross_unsafe = Some(*block),
            StateRecord::UpdateFinalized(block) => self.finalized = Some(*block),
            StateRecord::RewindLocalUnsafe { number } => self.truncate_blocks(*number),
            StateRecord::RewindCrossUnsafe(target) => {
                if self.cross_unsafe.is_some_and(|head| head.number >= target.number) {
                    self.cross_unsafe = Some(*target);
                }
            }
            StateRecord::RewindLocalSafe { number } => {
                self.truncate_local_safe(number + 1);
                if self.invalidated.is_some_and(|invalidated| invalidated.number > *number) {
                    self.invalidated = None;
                }
            }
            StateRecord::RewindCrossSafe { number } => self.reset_cross_safe_to(*number),
        }
    }

    /// Drops the sealed blocks above `number`.
    fn truncate_blocks(&mut self, number: u64) {
        let _ = self.blocks.split_off(&(number + 1));
        if self.cross_unsafe.is_some_and(|head| head.number > number) {
            self.cross_unsafe = self.blocks.get(&number).map(|sealed| sealed.block.seal());
        }
    }

    /// Drops the local-safe records at and above `number`, together with any cross-safe record
    /// that depended on them.
    fn truncate_local_safe(&mut self, number: u64) {
        let _ = self.local_derived.split_off(&number);
        self.reset_cross_safe_to(number.saturating_sub(1));
        if number == 0 {
            self.cross_derived.clear();
            self.cross_safe = None;
        }
    }

    fn reset_cross_safe_to(&mut self, number: u64) {
        let _ = self.cross_derived.split_off(&(number + 1));
        if self.cross_safe.is_some_and(|head| head.derived.number > number) {
            self.cross_safe = self.cross_derived.last_key_value().map(|(_, pair)| *pair);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use interop_supervisor_types::ChainIndex;

    fn block(number: u64) -> BlockRef {
        BlockRef::new(
            B256::with_last_byte(number as u8 + 1),
            number,
            B256::with_last_byte(number as u8),
            number * 2,
        )
    }

    fn source(number: u64) -> BlockRef {
        BlockRef::new(
            B256::repeat_byte(0x10 + number as u8),
            number,
            B256::repeat_byte(0x10 + number.saturating_sub(1) as u8),
            number * 12,
        )
    }

    #[test]
    fn test_records_survive_json() {
        let message = ExecutingMessage {
            chain: ChainIndex(2),
            block_number: 4,
            log_index: 1,
            timestamp: 8,
            hash: B256::repeat_byte(3),
        };
        let sealed = SealedBlock {
            block: block(1),
            log_count: 2,
            executing_messages: BTreeMap::from([(1, message)]),
        };
        let mut state = ChainState::default();
        state.apply(&StateRecord::Initialise(DerivedBlockRefPair::new(source(0), block(0))));
        state.apply(&StateRecord::SealBlock(sealed.clone()));

        let records = vec![
            StateRecord::SealBlock(sealed),
            StateRecord::RewindLocalUnsafe { number: 0 },
            state.snapshot(),
        ];
        for record in records {
            let json = serde_json::to_string(&record).unwrap();
            assert_eq!(serde_json::from_str::<StateRecord>(&json).unwrap(), record);
        }
    }

    #[test]
    fn test_invalidate_drops_dependent_records() {
        let mut state = ChainState::default();
        state.apply(&StateRecord::Initialise(DerivedBlockRefPair::new(source(0), block(0))));
        for number in 1..=3 {
            state.apply(&StateRecord::SealBlock(SealedBlock::empty(block(number))));
            let pair = DerivedBlockRefPair::new(source(1), block(number));
            state.apply(&StateRecord::SaveDerived(pair));
        }
        state.apply(&StateRecord::UpdateCrossSafe(DerivedBlockRefPair::new(source(1), block(1))));
        state.apply(&StateRecord::UpdateCrossSafe(DerivedBlockRefPair::new(source(1), block(2))));
        state.apply(&StateRecord::UpdateCrossUnsafe(block(3).seal()));

        state.apply(&StateRecord::InvalidateLocalSafe(block(2)));
        assert_eq!(state.latest_block().map(|sealed| sealed.block), Some(block(1)));
        assert_eq!(state.cross_unsafe, Some(block(1).seal()));
        assert_eq!(state.cross_safe.map(|pair| pair.derived), Some(block(1)));
        assert_eq!(state.local_derived.len(), 2);
        assert_eq!(state.invalidated, Some(block(2).seal()));

        // a replacement at the same height clears the marker
        state.apply(&StateRecord::SaveDerived(DerivedBlockRefPair::new(source(1), block(2))));
        assert_eq!(state.invalidated, None);
    }
}
