//! Per-chain state: sealed blocks and their logs, derivation records and safety heads.

use crate::{
    ChainLogDbMetrics, EntryNotFoundError, LogDb, Metrics, StorageRewinder,
    error::StorageError,
    journal::StateJournal,
    state::{ChainState, SealedBlock, StateRecord},
    traits::{
        DerivationStorageReader, DerivationStorageWriter, HeadRefStorageReader,
        HeadRefStorageWriter, LogStorageReader, LogStorageWriter,
    },
};
use alloy_eips::BlockNumHash;
use alloy_primitives::ChainId;
use interop_supervisor_metrics::{MetricsReporter, observe_metrics_for_result};
use interop_supervisor_types::{
    BlockRef, BlockSeal, ChainHeads, ChainIndex, ContainsQuery, DerivedBlockRefPair, Log,
    OpenedBlock, SafetyLevel,
};
use std::{
    collections::BTreeMap,
    fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tracing::{debug, error, info, warn};

const LOG_DB_FILE: &str = "logs.db";
const STATE_JOURNAL_FILE: &str = "state.jsonl";

/// The journal is rewritten as a single snapshot on open once it holds more records than this.
const JOURNAL_COMPACTION_THRESHOLD: u64 = 4096;

/// Manages the storage of a single chain.
///
/// Logs are persisted in a [`LogDb`] file. Block, derivation and head indexes are held in memory
/// and every change to them is first appended to a journal next to the log file, which is
/// replayed when the database is reopened.
#[derive(Debug)]
pub struct ChainDb {
    chain_id: ChainId,
    metrics_enabled: Option<bool>,

    logs: LogDb,
    journal: Mutex<StateJournal>,
    state: RwLock<ChainState>,
}

impl ChainDb {
    /// Creates or opens the database in directory `path`.
    pub fn new(chain_id: ChainId, path: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(path)?;
        let logs = LogDb::open(chain_id, &path.join(LOG_DB_FILE))?;
        Self::with_logs(chain_id, logs, &path.join(STATE_JOURNAL_FILE))
    }

    fn with_logs(
        chain_id: ChainId,
        logs: LogDb,
        journal_path: &Path,
    ) -> Result<Self, StorageError> {
        let (journal, records) = StateJournal::open::<StateRecord>(journal_path)?;
        let mut state = ChainState::default();
        for record in &records {
            state.apply(record);
        }

        let db = Self {
            chain_id,
            metrics_enabled: None,
            logs,
            journal: Mutex::new(journal),
            state: RwLock::new(state),
        };
        db.reconcile_logs()?;
        db.compact_journal()?;
        Ok(db)
    }

    /// Brings the log database and the block index back in line after an interrupted write.
    ///
    /// Logs of a block whose seal never reached the journal are dropped. Blocks whose logs are
    /// missing, left behind by a rewind that never reached the journal, are dropped too.
    fn reconcile_logs(&self) -> Result<(), StorageError> {
        let mut state = self.write_state()?;
        let indexed_head = state.latest_block().map_or(0, |sealed| sealed.block.number);
        if let Some((block_number, _)) = self.logs.latest_log()? {
            if block_number > indexed_head {
                warn!(
                    target: "supervisor::storage",
                    chain_id = self.chain_id,
                    block_number,
                    indexed_head,
                    "Discarding logs of unsealed blocks"
                );
                self.logs.rewind(indexed_head)?;
            }
        }

        let Some(latest_log) = self.logs.latest_log()? else {
            let first_with_logs = state
                .blocks
                .values()
                .find(|sealed| sealed.log_count > 0)
                .map(|sealed| sealed.block.number);
            return match first_with_logs {
                Some(number) => self.drop_blocks_without_logs(&mut state, number),
                None => Ok(()),
            };
        };
        let missing = state
            .blocks
            .values()
            .find(|sealed| {
                sealed.log_count > 0 &&
                    (sealed.block.number, sealed.log_count - 1) > latest_log
            })
            .map(|sealed| sealed.block.number);
        if let Some(number) = missing {
            return self.drop_blocks_without_logs(&mut state, number);
        }
        if state.last_indexed_log() != Some(latest_log) {
            return Err(StorageError::DataCorruption(format!(
                "last log {latest_log:?} is not indexed by any sealed block"
            )));
        }
        Ok(())
    }

    /// Drops sealed block `number` and everything above it.
    fn drop_blocks_without_logs(
        &self,
        state: &mut ChainState,
        number: u64,
    ) -> Result<(), StorageError> {
        let to = number.saturating_sub(1);
        state.check_above_finalized(to).map_err(|_| {
            StorageError::DataCorruption(format!("logs of finalized block {number} are missing"))
        })?;
        warn!(
            target: "supervisor::storage",
            chain_id = self.chain_id,
            block_number = number,
            "Dropping sealed blocks whose logs are missing"
        );
        self.logs.rewind(to)?;
        self.commit(state, StateRecord::RewindLocalUnsafe { number: to })
    }

    fn compact_journal(&self) -> Result<(), StorageError> {
        let state = self.read_state()?;
        let mut journal = self.lock_journal()?;
        if journal.records() > JOURNAL_COMPACTION_THRESHOLD {
            journal.compact(&[state.snapshot()])?;
        }
        Ok(())
    }

    /// Enables metrics on the database.
    pub fn with_metrics(mut self) -> Self {
        self.metrics_enabled = Some(true);
        Metrics::init(self.chain_id);
        self.logs = self.logs.with_metrics(Arc::new(ChainLogDbMetrics::new(self.chain_id)));
        self
    }

    /// The chain this database belongs to.
    pub const fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn observe_call<T, E, F: FnOnce() -> Result<T, E>>(
        &self,
        name: &'static str,
        f: F,
    ) -> Result<T, E> {
        if self.metrics_enabled.unwrap_or(false) {
            observe_metrics_for_result!(
                Metrics::STORAGE_REQUESTS_SUCCESS_TOTAL,
                Metrics::STORAGE_REQUESTS_ERROR_TOTAL,
                Metrics::STORAGE_REQUEST_DURATION_SECONDS,
                name,
                f(),
                "chain_id" => self.chain_id.to_string()
            )
        } else {
            f()
        }
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, ChainState>, StorageError> {
        self.state.read().map_err(|err| {
            error!(target: "supervisor::storage", chain_id = self.chain_id, %err, "Failed to acquire read lock on chain state");
            StorageError::LockPoisoned
        })
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, ChainState>, StorageError> {
        self.state.write().map_err(|err| {
            error!(target: "supervisor::storage", chain_id = self.chain_id, %err, "Failed to acquire write lock on chain state");
            StorageError::LockPoisoned
        })
    }

    fn lock_journal(&self) -> Result<MutexGuard<'_, StateJournal>, StorageError> {
        self.journal.lock().map_err(|err| {
            error!(target: "supervisor::storage", chain_id = self.chain_id, %err, "Failed to acquire lock on state journal");
            StorageError::LockPoisoned
        })
    }

    /// Journals `record`, then applies it to `state`.
    ///
    /// Callers hold the state write lock, so records reach the journal in the order they apply.
    fn commit(&self, state: &mut ChainState, record: StateRecord) -> Result<(), StorageError> {
        self.lock_journal()?.append(&record).inspect_err(|err| {
            error!(target: "supervisor::storage", chain_id = self.chain_id, %err, "Failed to journal state change");
        })?;
        state.apply(&record);
        Ok(())
    }

    /// Lowest local-safe block above the cross-safe head that executes a message initiated in
    /// block `block_number` of chain `initiating_chain`.
    pub fn first_local_safe_executing(
        &self,
        initiating_chain: ChainIndex,
        block_number: u64,
    ) -> Result<Option<DerivedBlockRefPair>, StorageError> {
        let state = self.read_state()?;
        let start = state.cross_safe.map_or(0, |head| head.derived.number + 1);
        Ok(state
            .local_derived
            .range(start..)
            .map(|(_, pair)| pair)
            .find(|pair| {
                state.blocks.get(&pair.derived.number).is_some_and(|sealed| {
                    sealed.block.hash == pair.derived.hash &&
                        sealed.executing_messages.values().any(|msg| {
                            msg.chain == initiating_chain && msg.block_number == block_number
                        })
                })
            })
            .copied())
    }

    fn seal_block_inner(
        &self,
        state: &mut ChainState,
        block: BlockRef,
        logs: &[Log],
    ) -> Result<(), StorageError> {
        if let Some(latest) = state.latest_block().map(|sealed| sealed.block) {
            if let Some(existing) = state.blocks.get(&block.number) {
                if existing.block == block {
                    return Ok(());
                }
                warn!(
                    target: "supervisor::storage",
                    chain_id = self.chain_id,
                    %block,
                    existing = %existing.block,
                    "Conflicting block at sealed height"
                );
                return Err(StorageError::ConflictError);
            }
            if block.number != latest.number + 1 || block.parent_hash != latest.hash {
                warn!(
                    target: "supervisor::storage",
                    chain_id = self.chain_id,
                    %block,
                    %latest,
                    "Block does not extend the latest sealed block"
                );
                return Err(StorageError::BlockOutOfOrder);
            }
        }

        let rollback_to = state.latest_block().map_or(0, |sealed| sealed.block.number);
        let mut executing_messages = BTreeMap::new();
        for log in logs {
            if let Err(err) =
                self.logs.add_log(&log.hash, block.id(), block.timestamp, log.index)
            {
                self.logs.rewind(rollback_to)?;
                return Err(err);
            }
            if let Some(message) = log.executing_message {
                executing_messages.insert(log.index, message);
            }
        }

        let sealed = SealedBlock { block, log_count: logs.len() as u32, executing_messages };
        if let Err(err) = self.commit(state, StateRecord::SealBlock(sealed)) {
            self.logs.rewind(rollback_to)?;
            return Err(err);
        }
        Ok(())
    }

    /// Checks that the sealed blocks above `to` may be dropped. Returns the record doing so.
    fn check_truncate_sealed(
        state: &ChainState,
        to: BlockNumHash,
    ) -> Result<StateRecord, StorageError> {
        state.check_above_finalized(to.number)?;
        state.sealed(to)?;
        Ok(StateRecord::RewindLocalUnsafe { number: to.number })
    }
}

impl LogStorageReader for ChainDb {
    fn open_block(&self, block_number: u64) -> Result<OpenedBlock, StorageError> {
        self.observe_call(Metrics::STORAGE_METHOD_OPEN_BLOCK, || {
            let state = self.read_state()?;
            if let Some(sealed) = state.blocks.get(&block_number) {
                return Ok(sealed.opened());
            }
            match state.latest_block() {
                Some(latest) if block_number < latest.block.number => {
                    Err(EntryNotFoundError::SealedBlockNotFound(block_number).into())
                }
                _ => Err(StorageError::FutureData),
            }
        })
    }

    fn find_sealed_block(&self, block_number: u64) -> Result<BlockSeal, StorageError> {
        self.observe_call(Metrics::STORAGE_METHOD_FIND_SEALED_BLOCK, || {
            self.open_block(block_number).map(|opened| opened.block.seal())
        })
    }

    fn latest_sealed_block(&self) -> Result<BlockSeal, StorageError> {
        let state = self.read_state()?;
        state
            .latest_block()
            .map(|sealed| sealed.block.seal())
            .ok_or_else(|| EntryNotFoundError::HeadNotSet(SafetyLevel::LocalUnsafe).into())
    }

    fn contains(&self, query: &ContainsQuery) -> Result<BlockSeal, StorageError> {
        self.observe_call(Metrics::STORAGE_METHOD_CONTAINS, || {
            let state = self.read_state()?;
            let latest = state.latest_block().ok_or(StorageError::FutureData)?;
            if query.block_number > latest.block.number {
                return Err(StorageError::FutureData);
            }
            let sealed = state
                .blocks
                .get(&query.block_number)
                .ok_or(EntryNotFoundError::SealedBlockNotFound(query.block_number))?;
            if sealed.block.timestamp != query.timestamp {
                debug!(
                    target: "supervisor::storage",
                    chain_id = self.chain_id,
                    block = %sealed.block,
                    expected = query.timestamp,
                    "Block timestamp mismatch"
                );
                return Err(StorageError::ConflictError);
            }
            if query.log_index >= sealed.log_count ||
                !self.logs.contains(query.block_number, query.log_index, &query.log_hash)?
            {
                debug!(
                    target: "supervisor::storage",
                    chain_id = self.chain_id,
                    block = %sealed.block,
                    log_index = query.log_index,
                    "Log not found"
                );
                return Err(StorageError::ConflictError);
            }
            Ok(sealed.block.seal())
        })
    }
}

impl LogStorageWriter for ChainDb {
    fn seal_block(&self, block: BlockRef, logs: &[Log]) -> Result<(), StorageError> {
        self.observe_call(Metrics::STORAGE_METHOD_SEAL_BLOCK, || {
            let mut state = self.write_state()?;
            self.seal_block_inner(&mut state, block, logs)?;
            debug!(
                target: "supervisor::storage",
                chain_id = self.chain_id,
                %block,
                logs = logs.len(),
                "Sealed block"
            );
            Ok(())
        })
    }
}

impl DerivationStorageReader for ChainDb {
    fn local_safe(&self) -> Result<DerivedBlockRefPair, StorageError> {
        let state = self.read_state()?;
        state
            .local_derived
            .last_key_value()
            .map(|(_, pair)| *pair)
            .ok_or_else(|| EntryNotFoundError::HeadNotSet(SafetyLevel::LocalSafe).into())
    }

    fn cross_safe(&self) -> Result<DerivedBlockRefPair, StorageError> {
        let state = self.read_state()?;
        state
            .cross_safe
            .ok_or_else(|| EntryNotFoundError::HeadNotSet(SafetyLevel::CrossSafe).into())
    }

    fn candidate_cross_safe(&self) -> Result<DerivedBlockRefPair, StorageError> {
        self.observe_call(Metrics::STORAGE_METHOD_CANDIDATE_CROSS_SAFE, || {
            let state = self.read_state()?;
            if let Some(invalidated) = state.invalidated {
                return Err(StorageError::AwaitingReplacement(invalidated.id()));
            }
            let head = state.cross_safe.ok_or(StorageError::DatabaseNotInitialised)?;
            let next = state
                .local_derived
                .get(&(head.derived.number + 1))
                .ok_or(StorageError::FutureData)?;
            if next.derived.parent_hash != head.derived.hash {
                warn!(
                    target: "supervisor::storage",
                    chain_id = self.chain_id,
                    candidate = %next.derived,
                    cross_safe = %head.derived,
                    "Local-safe block does not build on cross-safe head"
                );
                return Err(StorageError::ConflictError);
            }
            // the scope never shrinks below what the cross-safe head was checked in
            let source =
                if next.source.number <= head.source.number { head.source } else { next.source };
            Ok(DerivedBlockRefPair::new(source, next.derived))
        })
    }

    fn cross_derived_to_source(&self, derived: BlockNumHash) -> Result<BlockSeal, StorageError> {
        self.observe_call(Metrics::STORAGE_METHOD_CROSS_DERIVED_TO_SOURCE, || {
            let state = self.read_state()?;
            match state.cross_derived.get(&derived.number) {
                Some(pair) if pair.derived.hash == derived.hash => Ok(pair.source.seal()),
                Some(_) => Err(StorageError::ConflictError),
                None => match state.cross_safe {
                    Some(head) if derived.number <= head.derived.number => {
                        Err(EntryNotFoundError::DerivedBlockNotFound(derived.number).into())
                    }
                    _ => Err(StorageError::FutureData),
                },
            }
        })
    }

    fn next_source(&self, source: BlockNumHash) -> Result<BlockRef, StorageError> {
        let state = self.read_state()?;
        let known = state
            .sources
            .get(&source.number)
            .ok_or(EntryNotFoundError::SourceBlockNotFound(source.number))?;
        if known.hash != source.hash {
            return Err(StorageError::ConflictError);
        }
        state.sources.get(&(source.number + 1)).copied().ok_or(StorageError::FutureData)
    }

    fn previous_derived(&self, derived: BlockNumHash) -> Result<BlockSeal, StorageError> {
        let state = self.read_state()?;
        let known = state
            .local_derived
            .get(&derived.number)
            .ok_or(EntryNotFoundError::DerivedBlockNotFound(derived.number))?;
        if known.derived.hash != derived.hash {
            return Err(StorageError::ConflictError);
        }
        let previous = derived
            .number
            .checked_sub(1)
            .and_then(|number| state.local_derived.get(&number))
            .ok_or(EntryNotFoundError::DerivedBlockNotFound(derived.number.saturating_sub(1)))?;
        Ok(previous.derived.seal())
    }
}

impl DerivationStorageWriter for ChainDb {
    fn initialise(&self, anchor: DerivedBlockRefPair) -> Result<(), StorageError> {
        let mut state = self.write_state()?;
        if !state.cross_derived.is_empty() {
            return match state.cross_derived.get(&anchor.derived.number) {
                Some(existing) if *existing == anchor => Ok(()),
                _ => Err(StorageError::ConflictError),
            };
        }

        match state.blocks.get(&anchor.derived.number).map(|sealed| sealed.block.hash) {
            Some(hash) if hash != anchor.derived.hash => return Err(StorageError::ConflictError),
            Some(_) => {}
            None if state.blocks.is_empty() => {}
            None => return Err(StorageError::BlockOutOfOrder),
        }
        state.check_source(&anchor.source)?;
        match state.local_derived.get(&anchor.derived.number) {
            Some(existing) if *existing != anchor => return Err(StorageError::ConflictError),
            Some(_) => {}
            None if state.local_derived.is_empty() => {}
            None => return Err(StorageError::BlockOutOfOrder),
        }

        self.commit(&mut state, StateRecord::Initialise(anchor))?;
        info!(target: "supervisor::storage", chain_id = self.chain_id, %anchor, "Initialised chain");
        Ok(())
    }

    fn save_source_block(&self, source: BlockRef) -> Result<(), StorageError> {
        self.observe_call(Metrics::STORAGE_METHOD_SAVE_SOURCE_BLOCK, || {
            let mut state = self.write_state()?;
            if !state.check_source(&source)? {
                return Ok(());
            }
            self.commit(&mut state, StateRecord::SaveSource(source))
        })
    }

    fn save_derived_block(&self, pair: DerivedBlockRefPair) -> Result<(), StorageError> {
        self.observe_call(Metrics::STORAGE_METHOD_SAVE_DERIVED_BLOCK, || {
            let mut state = self.write_state()?;
            if let Some(existing) = state.local_derived.get(&pair.derived.number) {
                if *existing == pair {
                    return Ok(());
                }
                warn!(
                    target: "supervisor::storage",
                    chain_id = self.chain_id,
                    incoming = %pair,
                    existing = %existing,
                    "Conflicting derived block"
                );
                return Err(StorageError::ConflictError);
            }
            if state.invalidated.is_some_and(|invalidated| invalidated.id() == pair.derived.id()) {
                return Err(StorageError::ConflictError);
            }
            if let Some((_, last)) = state.local_derived.last_key_value() {
                if pair.derived.number != last.derived.number + 1 ||
                    pair.derived.parent_hash != last.derived.hash ||
                    pair.source.number < last.source.number
                {
                    return Err(StorageError::BlockOutOfOrder);
                }
            }
            state.check_source(&pair.source)?;

            let replaces_invalidated = state
                .invalidated
                .is_some_and(|invalidated| invalidated.number == pair.derived.number);
            self.commit(&mut state, StateRecord::SaveDerived(pair))?;
            if replaces_invalidated {
                info!(
                    target: "supervisor::storage",
                    chain_id = self.chain_id,
                    replacement = %pair.derived,
                    "Invalidated block replaced"
                );
            }
            Ok(())
        })
    }

    fn update_cross_safe(&self, source: BlockRef, derived: BlockRef) -> Result<(), StorageError> {
        self.observe_call(Metrics::STORAGE_METHOD_UPDATE_CROSS_SAFE, || {
            let mut state = self.write_state()?;
            match state.local_derived.get(&derived.number) {
                Some(local) if local.derived.hash == derived.hash => {}
                Some(_) => return Err(StorageError::ConflictError),
                None => return Err(StorageError::FutureData),
            }
            let head = state.cross_safe.ok_or(StorageError::DatabaseNotInitialised)?;
            if derived.number == head.derived.number {
                if derived.hash != head.derived.hash {
                    return Err(StorageError::ConflictError);
                }
            } else if derived.number != head.derived.number + 1 ||
                derived.parent_hash != head.derived.hash
            {
                return Err(StorageError::BlockOutOfOrder);
            }
            if source.number < head.source.number {
                return Err(StorageError::BlockOutOfOrder);
            }

            let pair = DerivedBlockRefPair::new(source, derived);
            self.commit(&mut state, StateRecord::UpdateCrossSafe(pair))?;
            info!(target: "supervisor::storage", chain_id = self.chain_id, %pair, "Updated cross-safe head");
            Ok(())
        })
    }

    fn invalidate_local_safe(&self, candidate: DerivedBlockRefPair) -> Result<(), StorageError> {
        self.observe_call(Metrics::STORAGE_METHOD_INVALIDATE_LOCAL_SAFE, || {
            let mut state = self.write_state()?;
            let number = candidate.derived.number;
            let existing = state
                .local_derived
                .get(&number)
                .ok_or(EntryNotFoundError::DerivedBlockNotFound(number))?;
            if existing.derived.hash != candidate.derived.hash {
                return Err(StorageError::ConflictError);
            }
            let parent = candidate.derived.parent_id();
            state.check_above_finalized(parent.number)?;
            if number > 0 && state.blocks.contains_key(&number) {
                Self::check_truncate_sealed(&state, parent)?;
                self.logs.rewind(parent.number)?;
            }
            self.commit(&mut state, StateRecord::InvalidateLocalSafe(candidate.derived))?;

            info!(
                target: "supervisor::storage",
                chain_id = self.chain_id,
                %candidate,
                "Invalidated local-safe block"
            );
            Ok(())
        })
    }
}

impl HeadRefStorageReader for ChainDb {
    fn get_safety_head(&self, level: SafetyLevel) -> Result<BlockSeal, StorageError> {
        self.heads()?.get(level).ok_or_else(|| EntryNotFoundError::HeadNotSet(level).into())
    }

    fn heads(&self) -> Result<ChainHeads, StorageError> {
        let state = self.read_state()?;
        Ok(ChainHeads {
            local_unsafe: state.latest_block().map(|sealed| sealed.block.seal()),
            cross_unsafe: state.cross_unsafe,
            local_safe: state.local_derived.last_key_value().map(|(_, pair)| pair.derived.seal()),
            cross_safe: state.cross_safe.map(|pair| pair.derived.seal()),
            finalized: state.finalized,
        })
    }
}

impl HeadRefStorageWriter for ChainDb {
    fn update_cross_unsafe(&self, block: BlockSeal) -> Result<(), StorageError> {
        let mut state = self.write_state()?;
        state.sealed(block.id())?;
        self.commit(&mut state, StateRecord::UpdateCrossUnsafe(block))
    }

    fn update_finalized(&self, block: BlockSeal) -> Result<(), StorageError> {
        let mut state = self.write_state()?;
        match state.cross_derived.get(&block.number) {
            Some(pair) if pair.derived.hash == block.hash => {}
            Some(_) => return Err(StorageError::ConflictError),
            None => return Err(EntryNotFoundError::DerivedBlockNotFound(block.number).into()),
        }
        if state.finalized.is_some_and(|finalized| finalized.number > block.number) {
            return Err(StorageError::BlockOutOfOrder);
        }
        self.commit(&mut state, StateRecord::UpdateFinalized(block))
    }
}

impl StorageRewinder for ChainDb {
    fn rewind_local_unsafe(&self, to: BlockNumHash) -> Result<(), StorageError> {
        self.observe_call(Metrics::STORAGE_METHOD_REWIND_LOCAL_UNSAFE, || {
            let mut state = self.write_state()?;
            let record = Self::check_truncate_sealed(&state, to)?;
            // the index never drops a block whose logs are still stored
            self.logs.rewind(to.number)?;
            self.commit(&mut state, record)?;
            info!(target: "supervisor::storage", chain_id = self.chain_id, to = to.number, "Rewound local-unsafe");
            Ok(())
        })
    }

    fn rewind_cross_unsafe(&self, to: BlockNumHash) -> Result<(), StorageError> {
        self.observe_call(Metrics::STORAGE_METHOD_REWIND_CROSS_UNSAFE, || {
            let mut state = self.write_state()?;
            state.check_above_finalized(to.number)?;
            let target = state.sealed(to)?.block.seal();
            self.commit(&mut state, StateRecord::RewindCrossUnsafe(target))
        })
    }

    fn rewind_local_safe(&self, to: BlockNumHash) -> Result<(), StorageError> {
        self.observe_call(Metrics::STORAGE_METHOD_REWIND_LOCAL_SAFE, || {
            let mut state = self.write_state()?;
            state.check_above_finalized(to.number)?;
            if state.local_derived.get(&to.number).is_some_and(|pair| pair.derived.hash != to.hash)
            {
                return Err(StorageError::ConflictError);
            }
            self.commit(&mut state, StateRecord::RewindLocalSafe { number: to.number })?;
            info!(target: "supervisor::storage", chain_id = self.chain_id, to = to.number, "Rewound local-safe");
            Ok(())
        })
    }

    fn rewind_cross_safe(&self, to: BlockNumHash) -> Result<(), StorageError> {
        self.observe_call(Metrics::STORAGE_METHOD_REWIND_CROSS_SAFE, || {
            let mut state = self.write_state()?;
            state.check_above_finalized(to.number)?;
            if state.cross_derived.get(&to.number).is_some_and(|pair| pair.derived.hash != to.hash)
            {
                return Err(StorageError::ConflictError);
            }
            self.commit(&mut state, StateRecord::RewindCrossSafe { number: to.number })?;
            info!(target: "supervisor::storage", chain_id = self.chain_id, to = to.number, "Rewound cross-safe");
            Ok(())
        })
    }
}

impl MetricsReporter for ChainDb {
    fn report_metrics(&self) {
        let heads = match self.heads() {
            Ok(heads) => heads,
            Err(err) => {
                error!(target: "supervisor::storage", chain_id = self.chain_id, %err, "Failed to read heads for metrics reporting");
                return;
            }
        };
        for level in [
            SafetyLevel::LocalUnsafe,
            SafetyLevel::CrossUnsafe,
            SafetyLevel::LocalSafe,
            SafetyLevel::CrossSafe,
            SafetyLevel::Finalized,
        ] {
            if let Some(head) = heads.get(level) {
                metrics::gauge!(
                    Metrics::STORAGE_HEAD_BLOCK_NUMBER,
                    "level" => level.to_string(),
                    "chain_id" => self.chain_id.to_string()
                )
                .set(head.number as f64);
            }
        }
    }
}
