//! Write-ahead journal of newline-delimited JSON records.
//!
//! Records are only appended. A record is durable once [`StateJournal::append`] returns. A
//! trailing line without its newline was cut short by a crash and is dropped on open.

use crate::StorageError;
use serde::{Serialize, de::DeserializeOwned};
use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

#[derive(Debug)]
pub(crate) struct StateJournal {
    path: PathBuf,
    file: File,
    /// Length of the file in bytes, up to the end of the last complete record.
    len: u64,
    records: u64,
}

impl StateJournal {
    /// Opens or creates the journal at `path` and decodes every complete record in it.
    pub(crate) fn open<T: DeserializeOwned>(path: &Path) -> Result<(Self, Vec<T>), StorageError> {
        let file = OpenOptions::new().read(true).create(true).append(true).open(path)?;
        let bytes = fs::read(path)?;
        let len = bytes.iter().rposition(|byte| *byte == b'\n').map_or(0, |at| at + 1);
        if len < bytes.len() {
            warn!(
                target: "supervisor::storage",
                path = %path.display(),
                dropped = bytes.len() - len,
                "Dropping partially written journal record"
            );
            file.set_len(len as u64)?;
        }

        let records = bytes[..len]
            .split(|byte| *byte == b'\n')
            .filter(|line| !line.is_empty())
            .enumerate()
            .map(|(index, line)| {
                serde_json::from_slice(line).map_err(|err| {
                    StorageError::DataCorruption(format!("journal record {index}: {err}"))
                })
            })
            .collect::<Result<Vec<T>, _>>()?;

        let journal = Self {
            path: path.to_path_buf(),
            file,
            len: len as u64,
            records: records.len() as u64,
        };
        Ok((journal, records))
    }

    /// Number of records in the journal.
    pub(crate) const fn records(&self) -> u64 {
        self.records
    }

    /// Appends `record` and syncs it to disk.
    pub(crate) fn append<T: Serialize>(&mut self, record: &T) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        if let Err(err) = self.file.write_all(&line).and_then(|_| self.file.sync_data()) {
            // drop whatever part of the record made it to disk
            self.file.set_len(self.len)?;
            return Err(err.into());
        }
        self.len += line.len() as u64;
        self.records += 1;
        Ok(())
    }

    /// Replaces the journal with `records`.
    ///
    /// The new journal is written next to the current one and renamed over it.
    pub(crate) fn compact<T: Serialize>(&mut self, records: &[T]) -> Result<(), StorageError> {
        let tmp_path = self.path.with_extension("tmp");
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        {
            let mut tmp =
                OpenOptions::new().create(true).write(true).truncate(true).open(&tmp_path)?;
            tmp.write_all(&buf)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        self.file = OpenOptions::new().read(true).append(true).open(&self.path)?;

        info!(
            target: "supervisor::storage",
            path = %self.path.display(),
            from = self.records,
            to = records.len(),
            "Compacted journal"
        );
        self.len = buf.len() as u64;
        self.records = records.len() as u64;
        Ok(())
    }
}
