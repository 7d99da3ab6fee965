use super::{
    entry::{EntryType, InitiatingEvent, LogContext, SearchCheckpoint, TruncatedHash},
    store::EntryStore,
};
use crate::StorageError;

/// Walks initiating events forward from a search checkpoint.
#[derive(Debug)]
pub(crate) struct LogIterator<'a> {
    store: &'a dyn EntryStore,
    next_entry_idx: u64,
    current: LogContext,
    entries_read: u64,
}

impl<'a> LogIterator<'a> {
    /// Starts right after the checkpoint at `checkpoint_idx` and its canonical hash.
    pub(crate) fn new(
        store: &'a dyn EntryStore,
        checkpoint_idx: u64,
    ) -> Result<Self, StorageError> {
        let checkpoint = SearchCheckpoint::decode(checkpoint_idx, &store.read(checkpoint_idx)?)?;
        Ok(Self {
            store,
            next_entry_idx: checkpoint_idx + 2,
            current: checkpoint.context(),
            entries_read: 0,
        })
    }

    /// Returns the position and hash of the next log, or `None` at the end of the store.
    pub(crate) fn next_log(
        &mut self,
    ) -> Result<Option<(LogContext, TruncatedHash)>, StorageError> {
        while self.next_entry_idx < self.store.len() {
            let entry_idx = self.next_entry_idx;
            let entry = self.store.read(entry_idx)?;
            self.next_entry_idx += 1;
            self.entries_read += 1;

            match entry.entry_type()? {
                EntryType::SearchCheckpoint => {
                    self.current = SearchCheckpoint::decode(entry_idx, &entry)?.context();
                }
                EntryType::InitiatingEvent => {
                    let event = InitiatingEvent::decode(entry_idx, &entry)?;
                    self.current = event.apply(self.current);
                    return Ok(Some((self.current, event.hash)));
                }
                // executing link and check records are not interpreted yet
                EntryType::CanonicalHash |
                EntryType::ExecutingLink |
                EntryType::ExecutingCheck |
                EntryType::Padding => {}
            }
        }
        Ok(None)
    }

    /// Position of the last log returned, or of the starting checkpoint.
    pub(crate) const fn current(&self) -> LogContext {
        self.current
    }

    /// Index of the entry the next call will read.
    pub(crate) const fn next_entry_idx(&self) -> u64 {
        self.next_entry_idx
    }

    pub(crate) const fn entries_read(&self) -> u64 {
        self.entries_read
    }
}
