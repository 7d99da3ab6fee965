//! Backing stores for log database records.

use super::entry::{ENTRY_SIZE, Entry};
use crate::StorageError;
use std::{
    fmt::Debug,
    fs::{File, OpenOptions},
    io::Write,
    os::unix::fs::FileExt,
    path::Path,
};
use tracing::warn;

/// Minimal record-level API the log database needs from its storage.
pub(crate) trait EntryStore: Debug + Send + Sync {
    /// Number of complete records.
    fn len(&self) -> u64;

    /// Reads the record at `index`.
    fn read(&self, index: u64) -> Result<Entry, StorageError>;

    /// Appends `entries` as a single write.
    fn append(&mut self, entries: &[Entry]) -> Result<(), StorageError>;

    /// Drops every record at or after `len`.
    fn truncate(&mut self, len: u64) -> Result<(), StorageError>;
}

/// Records persisted in a flat file, [`ENTRY_SIZE`] bytes each.
#[derive(Debug)]
pub(crate) struct FileEntryStore {
    file: File,
    len: u64,
}

impl FileEntryStore {
    /// Opens or creates the file at `path`.
    ///
    /// A trailing partial record left by an interrupted write is truncated away.
    pub(crate) fn open(path: &Path) -> Result<Self, StorageError> {
        let file = OpenOptions::new().read(true).create(true).append(true).open(path)?;
        let size = file.metadata()?.len();
        let entry_size = ENTRY_SIZE as u64;
        let len = size / entry_size;
        if size % entry_size != 0 {
            warn!(
                target: "supervisor::logdb",
                path = %path.display(),
                size,
                "Dropping partially written trailing record"
            );
            file.set_len(len * entry_size)?;
        }
        Ok(Self { file, len })
    }
}

impl EntryStore for FileEntryStore {
    fn len(&self) -> u64 {
        self.len
    }

    fn read(&self, index: u64) -> Result<Entry, StorageError> {
        if index >= self.len {
            return Err(StorageError::DataCorruption(format!(
                "read of entry {index} beyond end {}",
                self.len
            )));
        }
        let mut data = [0u8; ENTRY_SIZE];
        self.file.read_exact_at(&mut data, index * ENTRY_SIZE as u64)?;
        Ok(Entry(data))
    }

    fn append(&mut self, entries: &[Entry]) -> Result<(), StorageError> {
        let buf: Vec<u8> = entries.iter().flat_map(|entry| entry.0).collect();
        if let Err(err) = self.file.write_all(&buf).and_then(|_| self.file.flush()) {
            // drop whatever part of the batch made it to disk
            self.file.set_len(self.len * ENTRY_SIZE as u64)?;
            return Err(err.into());
        }
        self.len += entries.len() as u64;
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> Result<(), StorageError> {
        self.file.set_len(len * ENTRY_SIZE as u64)?;
        self.file.sync_all()?;
        self.len = len;
        Ok(())
    }
}

/// Records kept in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemoryEntryStore {
    pub(crate) entries: Vec<Entry>,
}

#[cfg(test)]
impl EntryStore for MemoryEntryStore {
    fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    fn read(&self, index: u64) -> Result<Entry, StorageError> {
        self.entries.get(index as usize).copied().ok_or_else(|| {
            StorageError::DataCorruption(format!(
                "read of entry {index} beyond end {}",
                self.entries.len()
            ))
        })
    }

    fn append(&mut self, entries: &[Entry]) -> Result<(), StorageError> {
        self.entries.extend_from_slice(entries);
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> Result<(), StorageError> {
        self.entries.truncate(len as usize);
        Ok(())
    }
}
