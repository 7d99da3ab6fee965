use crate::reorg::{BlockSourceError, RewinderError};
use alloy_primitives::ChainId;
use async_trait::async_trait;
use interop_supervisor_types::BlockRef;
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, RwLock},
};
use tracing::{error, info};

/// The canonical view of an L2 chain, used to find where the local database diverged.
///
/// Typically backed by the chain's node; implementations apply their own request timeouts.
#[async_trait]
pub trait L2BlockSource: Debug + Send + Sync {
    /// Returns the canonical block at `number`.
    async fn block_ref_by_number(&self, number: u64) -> Result<BlockRef, BlockSourceError>;
}

/// Registry of the [`L2BlockSource`] of every chain.
///
/// Looked up on every rewind, written once per chain on startup.
#[derive(Debug, Default)]
pub struct BlockSourceRegistry {
    sources: RwLock<HashMap<ChainId, Arc<dyn L2BlockSource>>>,
}

impl BlockSourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the block source of `chain_id`, replacing any previous one.
    pub fn register(
        &self,
        chain_id: ChainId,
        source: Arc<dyn L2BlockSource>,
    ) -> Result<(), RewinderError> {
        let mut sources = self.sources.write().map_err(|err| {
            error!(target: "supervisor::rewinder", %err, "Failed to acquire write lock on block sources");
            RewinderError::LockPoisoned
        })?;
        sources.insert(chain_id, source);
        info!(target: "supervisor::rewinder", chain_id, "Registered block source");
        Ok(())
    }

    /// Returns the block source of `chain_id`.
    pub fn get(&self, chain_id: ChainId) -> Result<Arc<dyn L2BlockSource>, RewinderError> {
        let sources = self.sources.read().map_err(|_| RewinderError::LockPoisoned)?;
        sources.get(&chain_id).cloned().ok_or(RewinderError::MissingBlockSource(chain_id))
    }
}
