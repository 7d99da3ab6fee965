use super::{
    entry::{
        Entry, InitiatingEvent, LogContext, SEARCH_CHECKPOINT_FREQUENCY, SearchCheckpoint,
        TruncatedHash, decode_canonical_hash, encode_canonical_hash, truncate_hash,
    },
    iterator::LogIterator,
    store::{EntryStore, FileEntryStore},
};
use crate::{EntryNotFoundError, LogDbMetrics, NoopLogDbMetrics, StorageError};
use alloy_eips::BlockNumHash;
use alloy_primitives::{B256, ChainId};
use std::{
    path::Path,
    sync::{Arc, RwLock},
};
use tracing::{debug, error, info, trace};

/// Append-only index of every log emitted on one chain.
///
/// Records are written in the order logs are produced. A search checkpoint every
/// [`SEARCH_CHECKPOINT_FREQUENCY`] records bounds the scan needed for any lookup.
#[derive(Debug)]
pub struct LogDb {
    chain_id: ChainId,
    inner: RwLock<LogDbInner>,
    metrics: Arc<dyn LogDbMetrics>,
}

#[derive(Debug)]
struct LogDbInner {
    store: Box<dyn EntryStore>,
    /// Position of the last appended log.
    head: LogContext,
}

impl LogDb {
    /// Opens the database file at `path`, creating it if needed, and restores the head.
    pub fn open(chain_id: ChainId, path: &Path) -> Result<Self, StorageError> {
        let store = FileEntryStore::open(path)?;
        Self::with_store(chain_id, Box::new(store))
    }

    pub(crate) fn with_store(
        chain_id: ChainId,
        store: Box<dyn EntryStore>,
    ) -> Result<Self, StorageError> {
        let mut inner = LogDbInner { store, head: LogContext::default() };
        inner.init()?;
        debug!(
            target: "supervisor::logdb",
            chain_id,
            entries = inner.store.len(),
            head_block = inner.head.block_number,
            head_log = inner.head.log_index,
            "Opened log database"
        );
        Ok(Self { chain_id, inner: RwLock::new(inner), metrics: Arc::new(NoopLogDbMetrics) })
    }

    /// Reports observations to `metrics` from now on.
    pub fn with_metrics(mut self, metrics: Arc<dyn LogDbMetrics>) -> Self {
        if let Ok(inner) = self.inner.get_mut() {
            metrics.record_entry_count(inner.store.len());
        }
        self.metrics = metrics;
        self
    }

    /// Appends a log.
    ///
    /// Logs must arrive in order: the next index within the current block, or index 0 of a later
    /// block. Block 0 never has logs.
    pub fn add_log(
        &self,
        log_hash: &B256,
        block: BlockNumHash,
        timestamp: u64,
        log_index: u32,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(|err| {
            error!(target: "supervisor::logdb", chain_id = self.chain_id, %err, "Failed to acquire write lock");
            StorageError::LockPoisoned
        })?;

        let next = LogContext::new(block.number, log_index);
        let head = inner.head;
        if block.number == 0 {
            return Err(StorageError::LogOutOfOrder("block 0 cannot contain logs".to_string()));
        }
        if block.number < head.block_number {
            return Err(StorageError::LogOutOfOrder(format!(
                "log in block {} is behind head block {}",
                block.number, head.block_number
            )));
        }
        if block.number == head.block_number && head.log_index.checked_add(1) != Some(log_index) {
            return Err(StorageError::LogOutOfOrder(format!(
                "expected log {} of block {}, got log {log_index}",
                head.log_index + 1,
                block.number
            )));
        }
        if block.number > head.block_number && log_index != 0 {
            return Err(StorageError::LogOutOfOrder(format!(
                "first log of block {} must have index 0, got {log_index}",
                block.number
            )));
        }

        let len = inner.store.len();
        let offset = len % SEARCH_CHECKPOINT_FREQUENCY;
        let far_ahead = block.number - head.block_number > u64::from(u8::MAX);
        let mut entries = Vec::with_capacity(3);
        let mut prev = head;
        if offset == 0 || far_ahead {
            if offset != 0 {
                let padding = SEARCH_CHECKPOINT_FREQUENCY - offset;
                debug!(
                    target: "supervisor::logdb",
                    chain_id = self.chain_id,
                    from_block = head.block_number,
                    to_block = block.number,
                    padding,
                    "Block gap too wide to encode, starting a new checkpoint"
                );
                entries.extend(std::iter::repeat_n(Entry::PADDING, padding as usize));
            }
            let checkpoint = SearchCheckpoint { block_number: block.number, log_index, timestamp };
            entries.push(checkpoint.encode());
            entries.push(encode_canonical_hash(&truncate_hash(&block.hash)));
            prev = next;
        }
        entries.push(InitiatingEvent::between(prev, next, truncate_hash(log_hash))?.encode());

        inner.store.append(&entries)?;
        inner.head = next;
        self.metrics.record_entry_count(inner.store.len());

        trace!(
            target: "supervisor::logdb",
            chain_id = self.chain_id,
            block_number = block.number,
            log_index,
            "Appended log"
        );
        Ok(())
    }

    /// Reports whether the log at (`block_number`, `log_index`) exists with hash `log_hash`.
    ///
    /// Only the truncated hash is compared.
    pub fn contains(
        &self,
        block_number: u64,
        log_index: u32,
        log_hash: &B256,
    ) -> Result<bool, StorageError> {
        let inner = self.read_inner()?;
        let target = LogContext::new(block_number, log_index);
        let Some(checkpoint_idx) = inner.search_checkpoint(target)? else {
            return Ok(false);
        };

        let mut iter = LogIterator::new(&*inner.store, checkpoint_idx)?;
        let found = Self::scan_for(&mut iter, target, &truncate_hash(log_hash));
        self.metrics.record_search_entries_read(iter.entries_read());
        found
    }

    fn scan_for(
        iter: &mut LogIterator<'_>,
        target: LogContext,
        hash: &TruncatedHash,
    ) -> Result<bool, StorageError> {
        while let Some((at, log_hash)) = iter.next_log()? {
            if at == target {
                return Ok(log_hash == *hash);
            }
            if at > target {
                break;
            }
        }
        Ok(false)
    }

    /// Block number and truncated hash of the nearest checkpointed block at or below
    /// `block_number`.
    pub fn closest_block_info(
        &self,
        block_number: u64,
    ) -> Result<(u64, TruncatedHash), StorageError> {
        let inner = self.read_inner()?;
        let checkpoint_idx = inner
            .search_checkpoint(LogContext::new(block_number, u32::MAX))?
            .ok_or(EntryNotFoundError::CheckpointNotFound(block_number))?;
        let checkpoint =
            SearchCheckpoint::decode(checkpoint_idx, &inner.store.read(checkpoint_idx)?)?;
        let hash =
            decode_canonical_hash(checkpoint_idx + 1, &inner.store.read(checkpoint_idx + 1)?)?;
        Ok((checkpoint.block_number, hash))
    }

    /// Drops every log of blocks above `head_block_number`.
    ///
    /// Rewinding to or past the current head block changes nothing.
    pub fn rewind(&self, head_block_number: u64) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(|err| {
            error!(target: "supervisor::logdb", chain_id = self.chain_id, %err, "Failed to acquire write lock");
            StorageError::LockPoisoned
        })?;
        if head_block_number >= inner.head.block_number {
            return Ok(());
        }

        let keep = match inner.search_checkpoint(LogContext::new(head_block_number + 1, 0))? {
            None => 0,
            Some(checkpoint_idx) => {
                let mut iter = LogIterator::new(&*inner.store, checkpoint_idx)?;
                let mut keep = checkpoint_idx;
                loop {
                    match iter.next_log()? {
                        // nothing after the target
                        None => return Ok(()),
                        Some((at, _)) if at.block_number > head_block_number => break,
                        Some(_) => keep = iter.next_entry_idx(),
                    }
                }
                keep
            }
        };

        let before = inner.store.len();
        inner.store.truncate(keep)?;
        inner.init()?;
        self.metrics.record_truncation();
        self.metrics.record_entry_count(keep);

        info!(
            target: "supervisor::logdb",
            chain_id = self.chain_id,
            head_block_number,
            removed = before - keep,
            "Rewound log database"
        );
        Ok(())
    }

    /// Position of the last appended log, or `None` if the database is empty.
    pub fn latest_log(&self) -> Result<Option<(u64, u32)>, StorageError> {
        let inner = self.read_inner()?;
        if inner.store.len() == 0 {
            return Ok(None);
        }
        Ok(Some((inner.head.block_number, inner.head.log_index)))
    }

    /// Number of records in the database.
    pub fn entry_count(&self) -> Result<u64, StorageError> {
        Ok(self.read_inner()?.store.len())
    }

    fn read_inner(&self) -> Result<std::sync::RwLockReadGuard<'_, LogDbInner>, StorageError> {
        self.inner.read().map_err(|err| {
            error!(target: "supervisor::logdb", chain_id = self.chain_id, %err, "Failed to acquire read lock");
            StorageError::LockPoisoned
        })
    }
}

impl LogDbInner {
    /// Restores the head by replaying from the last checkpoint.
    fn init(&mut self) -> Result<(), StorageError> {
        let len = self.store.len();
        if len == 0 {
            self.head = LogContext::default();
            return Ok(());
        }
        let last_checkpoint = (len - 1) / SEARCH_CHECKPOINT_FREQUENCY * SEARCH_CHECKPOINT_FREQUENCY;
        let head = {
            let mut iter = LogIterator::new(&*self.store, last_checkpoint)?;
            while iter.next_log()?.is_some() {}
            iter.current()
        };
        self.head = head;
        Ok(())
    }

    /// Index of the checkpoint to start a scan for `target` from.
    ///
    /// That is the checkpoint exactly at `target` if there is one, else the last checkpoint
    /// before it. `None` if every checkpoint is after `target`.
    fn search_checkpoint(&self, target: LogContext) -> Result<Option<u64>, StorageError> {
        let len = self.store.len();
        if len == 0 {
            return Ok(None);
        }
        let count = (len - 1) / SEARCH_CHECKPOINT_FREQUENCY + 1;
        let read_at = |i: u64| -> Result<LogContext, StorageError> {
            let idx = i * SEARCH_CHECKPOINT_FREQUENCY;
            Ok(SearchCheckpoint::decode(idx, &self.store.read(idx)?)?.context())
        };

        // first checkpoint not below target
        let (mut lo, mut hi) = (0u64, count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if read_at(mid)? < target {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        if lo < count && read_at(lo)? == target {
            return Ok(Some(lo * SEARCH_CHECKPOINT_FREQUENCY));
        }
        if lo == 0 {
            return Ok(None);
        }
        Ok(Some((lo - 1) * SEARCH_CHECKPOINT_FREQUENCY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logdb::{entry::EntryType, store::MemoryEntryStore};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn log_hash(block: u64, index: u32) -> B256 {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&block.to_be_bytes());
        bytes[8..12].copy_from_slice(&index.to_be_bytes());
        bytes[12] = 0xaa;
        B256::from(bytes)
    }

    fn block_id(number: u64) -> BlockNumHash {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&number.to_be_bytes());
        bytes[8] = 0xbb;
        BlockNumHash::new(number, B256::from(bytes))
    }

    fn memory_db() -> LogDb {
        LogDb::with_store(1, Box::<MemoryEntryStore>::default()).unwrap()
    }

    fn add_blocks(db: &LogDb, blocks: std::ops::RangeInclusive<u64>, logs_per_block: u32) {
        for number in blocks {
            for index in 0..logs_per_block {
                db.add_log(&log_hash(number, index), block_id(number), number * 2, index).unwrap();
            }
        }
    }

    fn entry_types(db: &LogDb) -> Vec<EntryType> {
        let inner = db.inner.read().unwrap();
        (0..inner.store.len())
            .map(|i| inner.store.read(i).unwrap().entry_type().unwrap())
            .collect()
    }

    #[derive(Debug, Default)]
    struct RecordingMetrics {
        entries_read: Mutex<Vec<u64>>,
        truncations: Mutex<u64>,
    }

    impl LogDbMetrics for RecordingMetrics {
        fn record_entry_count(&self, _count: u64) {}

        fn record_search_entries_read(&self, count: u64) {
            self.entries_read.lock().unwrap().push(count);
        }

        fn record_truncation(&self) {
            *self.truncations.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_contains_after_appending_blocks() {
        let db = memory_db();
        for (number, count) in [(1u64, 1u32), (2, 2), (3, 1)] {
            for index in 0..count {
                db.add_log(&log_hash(number, index), block_id(number), 100 + number, index)
                    .unwrap();
            }
        }

        assert!(db.contains(2, 1, &log_hash(2, 1)).unwrap());
        assert!(!db.contains(2, 2, &log_hash(2, 2)).unwrap());
        assert!(db.contains(1, 0, &log_hash(1, 0)).unwrap());
        assert!(db.contains(3, 0, &log_hash(3, 0)).unwrap());
        // right position, wrong hash
        assert!(!db.contains(2, 0, &log_hash(2, 1)).unwrap());
        assert!(!db.contains(4, 0, &log_hash(4, 0)).unwrap());
        assert_eq!(db.latest_log().unwrap(), Some((3, 0)));
    }

    #[test]
    fn test_contains_on_empty_db() {
        let db = memory_db();
        assert!(!db.contains(1, 0, &log_hash(1, 0)).unwrap());
        assert_eq!(db.latest_log().unwrap(), None);
        assert_eq!(db.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_add_log_rejects_out_of_order() {
        let db = memory_db();
        assert!(matches!(
            db.add_log(&log_hash(0, 0), block_id(0), 0, 0),
            Err(StorageError::LogOutOfOrder(_))
        ));

        db.add_log(&log_hash(5, 0), block_id(5), 10, 0).unwrap();
        db.add_log(&log_hash(5, 1), block_id(5), 10, 1).unwrap();

        // repeated index
        assert!(matches!(
            db.add_log(&log_hash(5, 1), block_id(5), 10, 1),
            Err(StorageError::LogOutOfOrder(_))
        ));
        // gap within the block
        assert!(matches!(
            db.add_log(&log_hash(5, 3), block_id(5), 10, 3),
            Err(StorageError::LogOutOfOrder(_))
        ));
        // older block
        assert!(matches!(
            db.add_log(&log_hash(4, 0), block_id(4), 8, 0),
            Err(StorageError::LogOutOfOrder(_))
        ));
        // new block not starting at zero
        assert!(matches!(
            db.add_log(&log_hash(6, 1), block_id(6), 12, 1),
            Err(StorageError::LogOutOfOrder(_))
        ));

        assert_eq!(db.latest_log().unwrap(), Some((5, 1)));
        assert_eq!(db.entry_count().unwrap(), 4);
    }

    #[test]
    fn test_add_log_after_wide_block_gap() {
        let db = memory_db();
        add_blocks(&db, 5..=5, 2);

        // 495 blocks without logs do not fit in a block diff
        db.add_log(&log_hash(500, 0), block_id(500), 1000, 0).unwrap();
        db.add_log(&log_hash(500, 1), block_id(500), 1000, 1).unwrap();

        let types = entry_types(&db);
        assert_eq!(types.len(), 260);
        assert!(types[4..256].iter().all(|kind| *kind == EntryType::Padding));
        assert_eq!(types[256], EntryType::SearchCheckpoint);
        assert_eq!(types[257], EntryType::CanonicalHash);
        assert_eq!(db.latest_log().unwrap(), Some((500, 1)));

        assert!(db.contains(5, 1, &log_hash(5, 1)).unwrap());
        assert!(db.contains(500, 0, &log_hash(500, 0)).unwrap());
        assert!(db.contains(500, 1, &log_hash(500, 1)).unwrap());
        assert!(!db.contains(200, 0, &log_hash(200, 0)).unwrap());
        assert_eq!(db.closest_block_info(499).unwrap().0, 5);
        assert_eq!(
            db.closest_block_info(700).unwrap(),
            (500, truncate_hash(&block_id(500).hash))
        );

        // the padded checkpoint is dropped with the block it was written for
        db.rewind(5).unwrap();
        assert_eq!(db.entry_count().unwrap(), 4);
        assert_eq!(db.latest_log().unwrap(), Some((5, 1)));
        db.add_log(&log_hash(400, 0), block_id(400), 800, 0).unwrap();
        assert!(db.contains(400, 0, &log_hash(400, 0)).unwrap());
    }

    #[test]
    fn test_reopen_after_wide_block_gap() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs.db");
        {
            let db = LogDb::open(1, &path).unwrap();
            add_blocks(&db, 1..=3, 3);
            add_blocks(&db, 1000..=1001, 1);
        }

        let db = LogDb::open(1, &path).unwrap();
        assert_eq!(db.latest_log().unwrap(), Some((1001, 0)));
        assert!(db.contains(1000, 0, &log_hash(1000, 0)).unwrap());
        assert!(db.contains(2, 2, &log_hash(2, 2)).unwrap());
        db.add_log(&log_hash(1300, 0), block_id(1300), 2600, 0).unwrap();
        assert_eq!(db.entry_count().unwrap(), 512 + 3);
    }

    #[test]
    fn test_checkpoints_every_frequency_entries() {
        let db = memory_db();
        add_blocks(&db, 1..=60, 10);

        let types = entry_types(&db);
        // 600 logs plus three checkpoint and canonical hash pairs
        assert_eq!(types.len(), 606);
        let checkpoints: Vec<usize> = types
            .iter()
            .enumerate()
            .filter(|(_, kind)| **kind == EntryType::SearchCheckpoint)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(checkpoints, vec![0, 256, 512]);
        for idx in checkpoints {
            assert_eq!(types[idx + 1], EntryType::CanonicalHash);
        }

        for number in 1..=60 {
            for index in 0..10 {
                assert!(db.contains(number, index, &log_hash(number, index)).unwrap());
            }
        }
    }

    #[test]
    fn test_closest_block_info() {
        let db = memory_db();
        add_blocks(&db, 1..=60, 10);

        // checkpoints land on (1, 0), (26, 4) and (51, 8)
        let hash_of = |n| truncate_hash(&block_id(n).hash);
        assert_eq!(db.closest_block_info(1).unwrap(), (1, hash_of(1)));
        assert_eq!(db.closest_block_info(25).unwrap(), (1, hash_of(1)));
        assert_eq!(db.closest_block_info(26).unwrap(), (26, hash_of(26)));
        assert_eq!(db.closest_block_info(50).unwrap(), (26, hash_of(26)));
        assert_eq!(db.closest_block_info(1000).unwrap(), (51, hash_of(51)));

        assert_eq!(
            db.closest_block_info(0),
            Err(StorageError::EntryNotFound(EntryNotFoundError::CheckpointNotFound(0)))
        );
    }

    #[test]
    fn test_rewind_within_checkpoint_range() {
        let metrics = Arc::new(RecordingMetrics::default());
        let db = LogDb::with_store(7, Box::<MemoryEntryStore>::default())
            .unwrap()
            .with_metrics(metrics.clone());
        add_blocks(&db, 1..=60, 10);

        db.rewind(30).unwrap();
        assert_eq!(db.entry_count().unwrap(), 304);
        assert_eq!(db.latest_log().unwrap(), Some((30, 9)));
        assert!(db.contains(30, 9, &log_hash(30, 9)).unwrap());
        assert!(!db.contains(31, 0, &log_hash(31, 0)).unwrap());
        assert!(db.closest_block_info(1000).unwrap().0 <= 30);
        assert_eq!(*metrics.truncations.lock().unwrap(), 1);

        // same target again is a no-op
        db.rewind(30).unwrap();
        assert_eq!(db.entry_count().unwrap(), 304);
        assert_eq!(*metrics.truncations.lock().unwrap(), 1);

        db.add_log(&log_hash(31, 0), block_id(31), 62, 0).unwrap();
        assert!(db.contains(31, 0, &log_hash(31, 0)).unwrap());
    }

    #[test]
    fn test_rewind_drops_later_checkpoint() {
        let db = memory_db();
        add_blocks(&db, 1..=60, 10);

        // the checkpoint at entry 256 sits in block 26, after the cut
        db.rewind(25).unwrap();
        assert_eq!(db.entry_count().unwrap(), 252);
        assert_eq!(db.latest_log().unwrap(), Some((25, 9)));
        assert_eq!(db.closest_block_info(60).unwrap().0, 1);
        assert!(!entry_types(&db)[1..].contains(&EntryType::SearchCheckpoint));
    }

    #[test]
    fn test_rewind_removes_checkpoint_at_cut() {
        let db = memory_db();
        add_blocks(&db, 1..=300, 1);

        // block 255 starts exactly at the second checkpoint
        db.rewind(254).unwrap();
        assert_eq!(db.entry_count().unwrap(), 256);
        assert_eq!(db.latest_log().unwrap(), Some((254, 0)));

        db.add_log(&log_hash(255, 0), block_id(255), 510, 0).unwrap();
        assert_eq!(entry_types(&db)[256], EntryType::SearchCheckpoint);
        assert!(db.contains(255, 0, &log_hash(255, 0)).unwrap());
    }

    #[test]
    fn test_rewind_before_first_log_empties_db() {
        let db = memory_db();
        add_blocks(&db, 3..=5, 2);

        db.rewind(2).unwrap();
        assert_eq!(db.entry_count().unwrap(), 0);
        assert_eq!(db.latest_log().unwrap(), None);

        // head was reset, so lower blocks are accepted again
        db.add_log(&log_hash(1, 0), block_id(1), 2, 0).unwrap();
        assert!(db.contains(1, 0, &log_hash(1, 0)).unwrap());
    }

    #[test]
    fn test_rewind_at_or_past_head_is_noop() {
        let db = memory_db();
        add_blocks(&db, 1..=3, 2);
        let count = db.entry_count().unwrap();

        db.rewind(3).unwrap();
        db.rewind(10).unwrap();
        assert_eq!(db.entry_count().unwrap(), count);
    }

    #[test]
    fn test_search_records_entries_read() {
        let metrics = Arc::new(RecordingMetrics::default());
        let db = LogDb::with_store(7, Box::<MemoryEntryStore>::default())
            .unwrap()
            .with_metrics(metrics.clone());
        add_blocks(&db, 1..=3, 1);

        assert!(db.contains(3, 0, &log_hash(3, 0)).unwrap());
        assert!(!db.contains(9, 0, &log_hash(9, 0)).unwrap());
        assert_eq!(*metrics.entries_read.lock().unwrap(), vec![3, 3]);
    }

    #[test]
    fn test_reopen_restores_head() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs.db");
        {
            let db = LogDb::open(1, &path).unwrap();
            add_blocks(&db, 1..=30, 10);
        }

        let db = LogDb::open(1, &path).unwrap();
        assert_eq!(db.latest_log().unwrap(), Some((30, 9)));
        assert!(db.contains(12, 3, &log_hash(12, 3)).unwrap());
        assert!(matches!(
            db.add_log(&log_hash(30, 9), block_id(30), 60, 9),
            Err(StorageError::LogOutOfOrder(_))
        ));
        db.add_log(&log_hash(31, 0), block_id(31), 62, 0).unwrap();
    }

    #[test]
    fn test_open_rejects_unknown_record_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs.db");
        {
            let db = LogDb::open(1, &path).unwrap();
            add_blocks(&db, 1..=2, 1);
        }
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 24;
        bytes[last] = 9;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            LogDb::open(1, &path),
            Err(StorageError::DataCorruption(_))
        ));
    }
}
