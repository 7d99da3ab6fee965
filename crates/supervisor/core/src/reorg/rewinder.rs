use crate::{
    event::{ChainEvent, ChainEventHandler, EventEmitter},
    reorg::{BlockSourceRegistry, RewinderError, metrics::Metrics},
};
use alloy_primitives::ChainId;
use async_trait::async_trait;
use interop_supervisor_metrics::observe_metrics_for_result_async;
use interop_supervisor_storage::{DbReader, EntryNotFoundError, StorageError, StorageRewinder};
use interop_supervisor_types::{BlockSeal, DerivedBlockRefPair, SafetyLevel};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Rewinds the safety heads of a single chain after it diverged from its block source.
#[derive(Debug)]
pub struct Rewinder<DB> {
    chain_id: ChainId,
    db: Arc<DB>,
    sources: Arc<BlockSourceRegistry>,
    emitter: Arc<EventEmitter>,
    metrics_enabled: bool,
}

impl<DB> Rewinder<DB>
where
    DB: DbReader + StorageRewinder + Send + Sync + 'static,
{
    /// Creates a rewinder for `chain_id`.
    pub const fn new(
        chain_id: ChainId,
        db: Arc<DB>,
        sources: Arc<BlockSourceRegistry>,
        emitter: Arc<EventEmitter>,
    ) -> Self {
        Self { chain_id, db, sources, emitter, metrics_enabled: false }
    }

    /// Initializes the metrics for the rewinder
    pub fn with_metrics(mut self) -> Self {
        self.metrics_enabled = true;
        Metrics::init(self.chain_id);
        self
    }

    /// Rewinds every safety head to the latest block below `bad_block` that the block source
    /// agrees with.
    ///
    /// Returns the new common head, or `None` if the reorg does not reach above the finalized
    /// head.
    pub async fn rewind_after_reorg(
        &self,
        bad_block: BlockSeal,
    ) -> Result<Option<BlockSeal>, RewinderError> {
        if self.metrics_enabled {
            observe_metrics_for_result_async!(
                Metrics::SUPERVISOR_REWIND_SUCCESS_TOTAL,
                Metrics::SUPERVISOR_REWIND_ERROR_TOTAL,
                Metrics::SUPERVISOR_REWIND_DURATION_SECONDS,
                Metrics::SUPERVISOR_REWIND_METHOD_CHAIN_REORG,
                async { self.inner_rewind_after_reorg(bad_block).await },
                "chain_id" => self.chain_id.to_string()
            )
        } else {
            self.inner_rewind_after_reorg(bad_block).await
        }
    }

    async fn inner_rewind_after_reorg(
        &self,
        bad_block: BlockSeal,
    ) -> Result<Option<BlockSeal>, RewinderError> {
        let finalized = self.finalized_height()?;
        let Some(top) = bad_block.number.checked_sub(1) else {
            info!(target: "supervisor::rewinder", chain_id = self.chain_id, %bad_block, "Reorg of genesis block, nothing to rewind");
            return Ok(None);
        };
        if finalized.is_some_and(|finalized| top <= finalized) {
            info!(
                target: "supervisor::rewinder",
                chain_id = self.chain_id,
                %bad_block,
                finalized,
                "Reorg below finalized head, ignoring"
            );
            return Ok(None);
        }

        let source = self.sources.get(self.chain_id)?;
        let floor = finalized.unwrap_or_default();

        let mut common = None;
        for height in (floor..=top).rev() {
            let local = match self.db.find_sealed_block(height) {
                Ok(local) => local,
                Err(StorageError::FutureData) |
                Err(StorageError::EntryNotFound(EntryNotFoundError::SealedBlockNotFound(_))) => {
                    trace!(target: "supervisor::rewinder", chain_id = self.chain_id, height, "Height not sealed locally");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let canonical = source.block_ref_by_number(height).await?;
            if canonical.hash == local.hash {
                common = Some(local);
                break;
            }
            debug!(
                target: "supervisor::rewinder",
                chain_id = self.chain_id,
                height,
                local = %local.hash,
                canonical = %canonical.hash,
                "Block differs from block source"
            );
        }
        let common = common.ok_or(RewinderError::NoCommonAncestor { chain_id: self.chain_id })?;

        self.rewind_heads_to(common)?;
        Ok(Some(common))
    }

    /// Rewinds every head at or above `common` to `common`, highest safety level first.
    fn rewind_heads_to(&self, common: BlockSeal) -> Result<(), RewinderError> {
        let heads = self.db.heads()?;
        let at_or_above = |level: SafetyLevel| {
            heads.get(level).is_some_and(|head| head.number >= common.number)
        };
        let to = common.id();

        if at_or_above(SafetyLevel::CrossSafe) {
            self.db.rewind_cross_safe(to)?;
        }
        if at_or_above(SafetyLevel::LocalSafe) {
            self.db.rewind_local_safe(to)?;
        }
        if at_or_above(SafetyLevel::CrossUnsafe) {
            self.db.rewind_cross_unsafe(to)?;
        }
        if at_or_above(SafetyLevel::LocalUnsafe) {
            self.db.rewind_local_unsafe(to)?;
        }

        let depth = heads.local_unsafe.map_or(0, |head| head.number.saturating_sub(common.number));
        info!(
            target: "supervisor::rewinder",
            chain_id = self.chain_id,
            head = %common,
            depth,
            "Rewound chain to common head"
        );
        if self.metrics_enabled {
            Metrics::record_depth(self.chain_id, depth);
        }
        self.emitter.emit(self.chain_id, ChainEvent::ChainRewound { head: common });
        Ok(())
    }

    /// Drops local-unsafe blocks that conflict with a newly derived local-safe block.
    ///
    /// Returns the new local-unsafe head if a rewind happened.
    pub async fn handle_local_derived(
        &self,
        derived: DerivedBlockRefPair,
    ) -> Result<Option<BlockSeal>, RewinderError> {
        if self.metrics_enabled {
            observe_metrics_for_result_async!(
                Metrics::SUPERVISOR_REWIND_SUCCESS_TOTAL,
                Metrics::SUPERVISOR_REWIND_ERROR_TOTAL,
                Metrics::SUPERVISOR_REWIND_DURATION_SECONDS,
                Metrics::SUPERVISOR_REWIND_METHOD_LOCAL_DERIVED,
                async { self.inner_handle_local_derived(derived) },
                "chain_id" => self.chain_id.to_string()
            )
        } else {
            self.inner_handle_local_derived(derived)
        }
    }

    fn inner_handle_local_derived(
        &self,
        derived: DerivedBlockRefPair,
    ) -> Result<Option<BlockSeal>, RewinderError> {
        let block = derived.derived;
        let local_unsafe = match self.db.latest_sealed_block() {
            Ok(head) => head,
            Err(StorageError::EntryNotFound(EntryNotFoundError::HeadNotSet(_))) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if local_unsafe.number < block.number {
            return Ok(None);
        }

        let sealed = self.db.find_sealed_block(block.number)?;
        if sealed.hash == block.hash {
            return Ok(None);
        }

        warn!(
            target: "supervisor::rewinder",
            chain_id = self.chain_id,
            derived = %block,
            sealed = %sealed,
            "Derived block conflicts with local-unsafe block, rewinding"
        );
        let parent = block.parent_id();
        self.db.rewind_local_unsafe(parent)?;
        let head = self.db.find_sealed_block(parent.number)?;

        let depth = local_unsafe.number.saturating_sub(head.number);
        debug!(target: "supervisor::rewinder", chain_id = self.chain_id, head = %head, depth, "Rewound local-unsafe head");
        if self.metrics_enabled {
            Metrics::record_depth(self.chain_id, depth);
        }
        self.emitter.emit(self.chain_id, ChainEvent::ChainRewound { head });
        Ok(Some(head))
    }

    fn finalized_height(&self) -> Result<Option<u64>, RewinderError> {
        match self.db.get_safety_head(SafetyLevel::Finalized) {
            Ok(finalized) => Ok(Some(finalized.number)),
            Err(StorageError::EntryNotFound(EntryNotFoundError::HeadNotSet(_))) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl<DB> ChainEventHandler for Rewinder<DB>
where
    DB: DbReader + StorageRewinder + std::fmt::Debug + Send + Sync + 'static,
{
    async fn on_event(&self, event: &ChainEvent) -> bool {
        let result = match *event {
            ChainEvent::ChainReorg { bad_block } => self.rewind_after_reorg(bad_block).await,
            ChainEvent::LocalDerived { derived_ref_pair } => {
                self.handle_local_derived(derived_ref_pair).await
            }
            _ => return false,
        };

        if let Err(err) = result {
            warn!(
                target: "supervisor::rewinder",
                chain_id = self.chain_id,
                ?event,
                %err,
                "Failed to rewind chain"
            );
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reorg::{BlockSourceError, L2BlockSource};
    use alloy_eips::BlockNumHash;
    use alloy_primitives::B256;
    use interop_supervisor_storage::{
        DerivationStorageReader, HeadRefStorageReader, LogStorageReader,
    };
    use interop_supervisor_types::{BlockRef, ChainHeads, ContainsQuery, OpenedBlock};
    use mockall::{mock, predicate};
    use tokio::sync::mpsc;

    mock!(
        #[derive(Debug)]
        pub Db {}

        impl LogStorageReader for Db {
            fn open_block(&self, block_number: u64) -> Result<OpenedBlock, StorageError>;
            fn find_sealed_block(&self, block_number: u64) -> Result<BlockSeal, StorageError>;
            fn latest_sealed_block(&self) -> Result<BlockSeal, StorageError>;
            fn contains(&self, query: &ContainsQuery) -> Result<BlockSeal, StorageError>;
        }

        impl DerivationStorageReader for Db {
            fn local_safe(&self) -> Result<DerivedBlockRefPair, StorageError>;
            fn cross_safe(&self) -> Result<DerivedBlockRefPair, StorageError>;
            fn candidate_cross_safe(&self) -> Result<DerivedBlockRefPair, StorageError>;
            fn cross_derived_to_source(&self, derived: BlockNumHash) -> Result<BlockSeal, StorageError>;
            fn next_source(&self, source: BlockNumHash) -> Result<BlockRef, StorageError>;
            fn previous_derived(&self, derived: BlockNumHash) -> Result<BlockSeal, StorageError>;
        }

        impl HeadRefStorageReader for Db {
            fn get_safety_head(&self, level: SafetyLevel) -> Result<BlockSeal, StorageError>;
            fn heads(&self) -> Result<ChainHeads, StorageError>;
        }

        impl StorageRewinder for Db {
            fn rewind_local_unsafe(&self, to: BlockNumHash) -> Result<(), StorageError>;
            fn rewind_cross_unsafe(&self, to: BlockNumHash) -> Result<(), StorageError>;
            fn rewind_local_safe(&self, to: BlockNumHash) -> Result<(), StorageError>;
            fn rewind_cross_safe(&self, to: BlockNumHash) -> Result<(), StorageError>;
        }
    );

    mock!(
        #[derive(Debug)]
        pub Source {}

        #[async_trait]
        impl L2BlockSource for Source {
            async fn block_ref_by_number(&self, number: u64) -> Result<BlockRef, BlockSourceError>;
        }
    );

    const CHAIN: ChainId = 10;

    fn local(number: u64) -> BlockSeal {
        BlockSeal::new(B256::from([number as u8; 32]), number, number * 2)
    }

    fn canonical(number: u64, reorged: bool) -> BlockRef {
        let hash =
            if reorged { B256::from([0xf0 | number as u8; 32]) } else { local(number).hash };
        BlockRef::new(hash, number, local(number.saturating_sub(1)).hash, number * 2)
    }

    fn not_set(level: SafetyLevel) -> StorageError {
        EntryNotFoundError::HeadNotSet(level).into()
    }

    struct Setup {
        rewinder: Rewinder<MockDb>,
        events: mpsc::Receiver<ChainEvent>,
    }

    fn setup(db: MockDb, source: Option<MockSource>) -> Setup {
        let sources = Arc::new(BlockSourceRegistry::new());
        if let Some(source) = source {
            sources.register(CHAIN, Arc::new(source)).unwrap();
        }
        let emitter = Arc::new(EventEmitter::new());
        let (tx, events) = mpsc::channel(8);
        emitter.register(CHAIN, tx);
        Setup { rewinder: Rewinder::new(CHAIN, Arc::new(db), sources, emitter), events }
    }

    #[tokio::test]
    async fn test_rewind_to_common_head() {
        // local 0..=5, the source diverges from block 3
        let mut db = MockDb::new();
        db.expect_get_safety_head().returning(|level| Err(not_set(level)));
        db.expect_find_sealed_block().returning(|number| Ok(local(number)));
        db.expect_heads().returning(|| {
            Ok(ChainHeads {
                local_unsafe: Some(local(5)),
                cross_unsafe: Some(local(4)),
                local_safe: Some(local(3)),
                cross_safe: Some(local(1)),
                finalized: None,
            })
        });
        db.expect_rewind_cross_safe().never();
        db.expect_rewind_local_safe()
            .with(predicate::eq(local(2).id()))
            .times(1)
            .returning(|_| Ok(()));
        db.expect_rewind_cross_unsafe()
            .with(predicate::eq(local(2).id()))
            .times(1)
            .returning(|_| Ok(()));
        db.expect_rewind_local_unsafe()
            .with(predicate::eq(local(2).id()))
            .times(1)
            .returning(|_| Ok(()));

        let mut source = MockSource::new();
        source
            .expect_block_ref_by_number()
            .times(3)
            .returning(|number| Ok(canonical(number, number >= 3)));

        let Setup { rewinder, mut events } = setup(db, Some(source));
        assert_eq!(rewinder.rewind_after_reorg(local(5)).await, Ok(Some(local(2))));
        assert_eq!(events.recv().await, Some(ChainEvent::ChainRewound { head: local(2) }));
    }

    #[tokio::test]
    async fn test_reorg_below_finalized_is_ignored() {
        let mut db = MockDb::new();
        db.expect_get_safety_head().returning(|_| Ok(local(4)));
        db.expect_heads().never();
        let mut source = MockSource::new();
        source.expect_block_ref_by_number().never();

        let Setup { rewinder, .. } = setup(db, Some(source));
        assert_eq!(rewinder.rewind_after_reorg(local(5)).await, Ok(None));
    }

    #[tokio::test]
    async fn test_scan_stops_at_finalized() {
        let mut db = MockDb::new();
        db.expect_get_safety_head().returning(|_| Ok(local(2)));
        db.expect_find_sealed_block().returning(|number| Ok(local(number)));
        let mut source = MockSource::new();
        source.expect_block_ref_by_number().times(3).returning(|number| Ok(canonical(number, true)));

        let Setup { rewinder, .. } = setup(db, Some(source));
        assert_eq!(
            rewinder.rewind_after_reorg(local(5)).await,
            Err(RewinderError::NoCommonAncestor { chain_id: CHAIN })
        );
    }

    #[tokio::test]
    async fn test_missing_block_source() {
        let mut db = MockDb::new();
        db.expect_get_safety_head().returning(|level| Err(not_set(level)));

        let Setup { rewinder, .. } = setup(db, None);
        assert_eq!(
            rewinder.rewind_after_reorg(local(5)).await,
            Err(RewinderError::MissingBlockSource(CHAIN))
        );
    }

    #[tokio::test]
    async fn test_block_source_error_propagates() {
        let mut db = MockDb::new();
        db.expect_get_safety_head().returning(|level| Err(not_set(level)));
        db.expect_find_sealed_block().returning(|number| Ok(local(number)));
        db.expect_heads().never();
        let mut source = MockSource::new();
        source
            .expect_block_ref_by_number()
            .returning(|number| Err(BlockSourceError::NotFound(number)));

        let Setup { rewinder, .. } = setup(db, Some(source));
        assert_eq!(
            rewinder.rewind_after_reorg(local(5)).await,
            Err(RewinderError::BlockSource(BlockSourceError::NotFound(4)))
        );
    }

    #[tokio::test]
    async fn test_local_derived_conflict_rewinds_local_unsafe() {
        let derived = BlockRef::new(B256::from([0xaa; 32]), 4, local(3).hash, 8);
        let mut db = MockDb::new();
        db.expect_latest_sealed_block().returning(|| Ok(local(6)));
        db.expect_find_sealed_block().returning(|number| Ok(local(number)));
        db.expect_rewind_local_unsafe()
            .with(predicate::eq(local(3).id()))
            .times(1)
            .returning(|_| Ok(()));

        let Setup { rewinder, mut events } = setup(db, None);
        let pair = DerivedBlockRefPair::new(BlockRef::default(), derived);
        assert!(rewinder.on_event(&ChainEvent::LocalDerived { derived_ref_pair: pair }).await);
        assert_eq!(events.recv().await, Some(ChainEvent::ChainRewound { head: local(3) }));
    }

    #[tokio::test]
    async fn test_local_derived_head_above_earlier_read() {
        // the head found after the rewind is above the local-unsafe head read before it
        let derived = BlockRef::new(B256::from([0xaa; 32]), 4, local(3).hash, 8);
        let mut db = MockDb::new();
        db.expect_latest_sealed_block().returning(|| Ok(local(4)));
        db.expect_find_sealed_block()
            .with(predicate::eq(4))
            .returning(|number| Ok(local(number)));
        db.expect_find_sealed_block().with(predicate::eq(3)).returning(|_| Ok(local(7)));
        db.expect_rewind_local_unsafe().times(1).returning(|_| Ok(()));

        let Setup { rewinder, mut events } = setup(db, None);
        let rewinder = rewinder.with_metrics();
        let pair = DerivedBlockRefPair::new(BlockRef::default(), derived);
        assert_eq!(rewinder.handle_local_derived(pair).await, Ok(Some(local(7))));
        assert_eq!(events.recv().await, Some(ChainEvent::ChainRewound { head: local(7) }));
    }

    #[tokio::test]
    async fn test_local_derived_without_conflict() {
        let mut db = MockDb::new();
        db.expect_latest_sealed_block().returning(|| Ok(local(6)));
        db.expect_find_sealed_block().returning(|number| Ok(local(number)));
        db.expect_rewind_local_unsafe().never();
        let Setup { rewinder, .. } = setup(db, None);

        let matching = BlockRef::new(local(4).hash, 4, local(3).hash, 8);
        let pair = DerivedBlockRefPair::new(BlockRef::default(), matching);
        assert_eq!(rewinder.handle_local_derived(pair).await, Ok(None));

        let ahead = BlockRef::new(B256::from([0xaa; 32]), 7, local(6).hash, 14);
        let pair = DerivedBlockRefPair::new(BlockRef::default(), ahead);
        assert_eq!(rewinder.handle_local_derived(pair).await, Ok(None));
    }
}
