//! Per-chain log database.
//!
//! A flat file of fixed-size records. Logs are appended strictly in order and only ever removed
//! from the tail, by [`LogDb::rewind`].

mod db;
pub use db::LogDb;

mod entry;
pub use entry::{SEARCH_CHECKPOINT_FREQUENCY, TruncatedHash, truncate_hash};

mod iterator;

mod store;
#[cfg(test)]
pub(crate) use entry::Entry;
#[cfg(test)]
pub(crate) use store::{EntryStore, MemoryEntryStore};
