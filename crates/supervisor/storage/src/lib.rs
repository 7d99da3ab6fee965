//! Persistent storage for the Supervisor.
//!
//! This crate provides append-only storage for the Supervisor, exposing per-chain APIs to write
//! and query logs, block metadata and derivation records, and a factory that gives the cross-chain
//! safety checks access to every chain at once.
//!
//! Logs are kept in a flat file of fixed-size records per chain, the [`LogDb`]. Block metadata,
//! derivation records and safety heads are indexed in memory by [`ChainDb`], which journals every
//! change next to the log file and replays the journal when reopened.
//!
//! ## Capabilities
//!
//! - Append logs emitted by L2 execution and seal the blocks that contain them
//! - Resolve initiating messages by block, log index and hash
//! - Track source and derived blocks and the cross-safe progress of each chain
//! - Rewind every safety level during reorgs

mod error;
pub use error::{EntryNotFoundError, StorageError};

pub mod logdb;
pub use logdb::LogDb;

mod metrics;
pub(crate) use metrics::Metrics;
pub use metrics::{ChainLogDbMetrics, LogDbMetrics, NoopLogDbMetrics};

mod journal;

mod state;

mod chaindb;
pub use chaindb::ChainDb;

mod chaindb_factory;
pub use chaindb_factory::ChainDbFactory;

mod traits;
pub use traits::{
    CrossChainSafetyProvider, DbReader, DerivationStorage, DerivationStorageReader,
    DerivationStorageWriter, HeadRefStorage, HeadRefStorageReader, HeadRefStorageWriter,
    LogStorage, LogStorageReader, LogStorageWriter, StorageRewinder,
};
