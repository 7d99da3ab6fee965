use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, RwLock},
};

use crate::{
    CrossChainSafetyProvider, DerivationStorageReader, DerivationStorageWriter, LogStorageReader,
    Metrics, chaindb::ChainDb, error::StorageError,
};
use alloy_eips::BlockNumHash;
use alloy_primitives::ChainId;
use interop_supervisor_metrics::{MetricsReporter, observe_metrics_for_result};
use interop_supervisor_types::{
    BlockRef, BlockSeal, ContainsQuery, DependencySet, DependentBlock, DerivedBlockRefPair,
    OpenedBlock,
};
use tracing::{debug, error};

/// Factory for managing multiple chain databases.
/// This struct allows for the creation and retrieval of `ChainDb` instances
/// based on chain IDs, ensuring that each chain has its own database instance.
#[derive(Debug)]
pub struct ChainDbFactory<D> {
    db_path: PathBuf,
    metrics_enabled: Option<bool>,
    dependency_set: D,

    dbs: RwLock<HashMap<ChainId, Arc<ChainDb>>>,
}

impl<D: DependencySet> ChainDbFactory<D> {
    /// Create a new, empty factory.
    pub fn new(db_path: PathBuf, dependency_set: D) -> Self {
        Self {
            db_path,
            metrics_enabled: None,
            dependency_set,
            dbs: RwLock::new(HashMap::new()),
        }
    }

    /// Enables metrics on the database environment.
    pub fn with_metrics(mut self) -> Self {
        self.metrics_enabled = Some(true);
        self
    }

    fn observe_call<T, E, F: FnOnce() -> Result<T, E>>(
        &self,
        name: &'static str,
        chain_id: ChainId,
        f: F,
    ) -> Result<T, E> {
        if self.metrics_enabled.unwrap_or(false) {
            observe_metrics_for_result!(
                Metrics::STORAGE_REQUESTS_SUCCESS_TOTAL,
                Metrics::STORAGE_REQUESTS_ERROR_TOTAL,
                Metrics::STORAGE_REQUEST_DURATION_SECONDS,
                name,
                f(),
                "chain_id" => chain_id.to_string()
            )
        } else {
            f()
        }
    }

    /// Get or create a [`ChainDb`] for the given chain id.
    ///
    /// If the database does not exist, it will be created at the path `self.db_path/<chain_id>`.
    pub fn get_or_create_db(&self, chain_id: ChainId) -> Result<Arc<ChainDb>, StorageError> {
        {
            // Try to get it without locking for write
            let dbs = self.dbs.read().map_err(|err| {
                error!(target: "supervisor::storage", %err, "Failed to acquire read lock on databases");
                StorageError::LockPoisoned
            })?;
            if let Some(db) = dbs.get(&chain_id) {
                return Ok(db.clone());
            }
        }

        // Not found, create and insert
        let mut dbs = self.dbs.write().map_err(|err| {
            error!(target: "supervisor::storage", %err, "Failed to acquire write lock on databases");
            StorageError::LockPoisoned
        })?;
        // Double-check in case another thread inserted
        if let Some(db) = dbs.get(&chain_id) {
            return Ok(db.clone());
        }

        let chain_db_path = self.db_path.join(chain_id.to_string());
        let mut chain_db = ChainDb::new(chain_id, chain_db_path.as_path())?;
        if self.metrics_enabled.unwrap_or(false) {
            chain_db = chain_db.with_metrics();
        }
        let db = Arc::new(chain_db);
        dbs.insert(chain_id, db.clone());
        Ok(db)
    }

    /// Get a [`ChainDb`] for the given chain id, returning an error if it doesn't exist.
    ///
    /// # Returns
    /// * `Ok(Arc<ChainDb>)` if the database exists.
    /// * `Err(StorageError)` if the database does not exist.
    pub fn get_db(&self, chain_id: ChainId) -> Result<Arc<ChainDb>, StorageError> {
        let dbs = self.dbs.read().map_err(|_| StorageError::LockPoisoned)?;
        dbs.get(&chain_id).cloned().ok_or_else(|| StorageError::DatabaseNotInitialised)
    }

    /// The dependency set the databases belong to.
    pub const fn dependency_set(&self) -> &D {
        &self.dependency_set
    }

    /// Every open database, ordered by chain id.
    fn all_dbs(&self) -> Result<Vec<Arc<ChainDb>>, StorageError> {
        let dbs = self.dbs.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut all: Vec<Arc<ChainDb>> = dbs.values().cloned().collect();
        all.sort_by_key(|db| db.chain_id());
        Ok(all)
    }
}

impl<D> MetricsReporter for ChainDbFactory<D> {
    fn report_metrics(&self) {
        let metrics_enabled = self.metrics_enabled.unwrap_or(false);
        if metrics_enabled {
            let dbs: Vec<Arc<ChainDb>> = {
                match self.dbs.read() {
                    Ok(dbs_guard) => dbs_guard.values().cloned().collect(),
                    Err(_) => {
                        error!(target: "supervisor::storage", "Failed to acquire read lock for metrics reporting");
                        return;
                    }
                }
            };
            for db in dbs {
                db.report_metrics();
            }
        }
    }
}

impl<D: DependencySet> CrossChainSafetyProvider for ChainDbFactory<D> {
    fn open_block(
        &self,
        chain_id: ChainId,
        block_number: u64,
    ) -> Result<OpenedBlock, StorageError> {
        self.get_db(chain_id)?.open_block(block_number)
    }

    fn contains(
        &self,
        chain_id: ChainId,
        query: &ContainsQuery,
    ) -> Result<BlockSeal, StorageError> {
        self.get_db(chain_id)?.contains(query)
    }

    fn candidate_cross_safe(
        &self,
        chain_id: ChainId,
    ) -> Result<DerivedBlockRefPair, StorageError> {
        self.get_db(chain_id)?.candidate_cross_safe()
    }

    fn cross_safe(&self, chain_id: ChainId) -> Result<DerivedBlockRefPair, StorageError> {
        self.get_db(chain_id)?.cross_safe()
    }

    fn cross_derived_to_source(
        &self,
        chain_id: ChainId,
        derived: BlockNumHash,
    ) -> Result<BlockSeal, StorageError> {
        self.get_db(chain_id)?.cross_derived_to_source(derived)
    }

    fn next_source(
        &self,
        chain_id: ChainId,
        source: BlockNumHash,
    ) -> Result<BlockRef, StorageError> {
        self.get_db(chain_id)?.next_source(source)
    }

    fn previous_derived(
        &self,
        chain_id: ChainId,
        derived: BlockNumHash,
    ) -> Result<BlockSeal, StorageError> {
        self.get_db(chain_id)?.previous_derived(derived)
    }

    fn update_cross_safe(
        &self,
        chain_id: ChainId,
        source: BlockRef,
        derived: BlockRef,
    ) -> Result<(), StorageError> {
        self.get_db(chain_id)?.update_cross_safe(source, derived)
    }

    fn invalidate_local_safe(
        &self,
        chain_id: ChainId,
        candidate: DerivedBlockRefPair,
    ) -> Result<(), StorageError> {
        self.get_db(chain_id)?.invalidate_local_safe(candidate)
    }

    fn find_dependent_blocks(
        &self,
        chain_id: ChainId,
        block: BlockNumHash,
    ) -> Result<Vec<DependentBlock>, StorageError> {
        self.observe_call(Metrics::STORAGE_METHOD_FIND_DEPENDENT_BLOCKS, chain_id, || {
            let chain_index = self
                .dependency_set
                .chain_index_from_id(chain_id)
                .map_err(|_| StorageError::UnknownChain(chain_id))?;

            let mut dependents = Vec::new();
            for db in self.all_dbs()? {
                if db.chain_id() == chain_id {
                    continue;
                }
                if let Some(pair) = db.first_local_safe_executing(chain_index, block.number)? {
                    debug!(
                        target: "supervisor::storage",
                        chain_id = db.chain_id(),
                        dependent = %pair.derived,
                        initiating_chain = chain_id,
                        initiating_block = block.number,
                        "Found dependent block"
                    );
                    dependents.push(DependentBlock::new(db.chain_id(), pair));
                }
            }
            Ok(dependents)
        })
    }
}
