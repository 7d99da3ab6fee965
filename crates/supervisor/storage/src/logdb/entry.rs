//! Fixed-size record codec.
//!
//! Every record is [`ENTRY_SIZE`] bytes, type byte first, little-endian integers, right-padded
//! with zeroes:
//!
//! ```text
//! type 0 search checkpoint  <0><block number: u64><log index: u32><timestamp: u64>
//! type 1 canonical hash     <1><block hash truncated: 20 bytes>
//! type 2 initiating event   <2><block number diff: u8><flags: u8><log hash truncated: 20 bytes>
//! type 3 executing link     reserved
//! type 4 executing check    reserved
//! type 5 padding            <5>
//! ```
//!
//! Padding fills the space up to the next checkpoint slot when a checkpoint has to be written
//! early, so checkpoints always sit at multiples of [`SEARCH_CHECKPOINT_FREQUENCY`].

use crate::StorageError;
use alloy_primitives::{B256, FixedBytes};

/// Size of every record in bytes.
pub(crate) const ENTRY_SIZE: usize = 24;

/// Search checkpoints are only ever written at entry indexes that are a multiple of this value.
///
/// One is due at every such index, and before any log more than [`u8::MAX`] blocks after the
/// previous log.
pub const SEARCH_CHECKPOINT_FREQUENCY: u64 = 256;

/// Set on initiating events whose log index is one past the previous log.
const FLAG_INCREMENT_LOG_INDEX: u8 = 0x01;

/// First 20 bytes of a 32 byte hash, as persisted in the log database.
pub type TruncatedHash = FixedBytes<20>;

/// Truncates a hash to the persisted width.
pub fn truncate_hash(hash: &B256) -> TruncatedHash {
    TruncatedHash::from_slice(&hash[..20])
}

/// Record type, stored in the first byte of every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum EntryType {
    SearchCheckpoint = 0,
    CanonicalHash = 1,
    InitiatingEvent = 2,
    ExecutingLink = 3,
    ExecutingCheck = 4,
    Padding = 5,
}

impl TryFrom<u8> for EntryType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::SearchCheckpoint),
            1 => Ok(Self::CanonicalHash),
            2 => Ok(Self::InitiatingEvent),
            3 => Ok(Self::ExecutingLink),
            4 => Ok(Self::ExecutingCheck),
            5 => Ok(Self::Padding),
            other => Err(other),
        }
    }
}

/// One raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Entry(pub(crate) [u8; ENTRY_SIZE]);

impl Entry {
    /// Filler record, skipped by readers.
    pub(crate) const PADDING: Self = Self::with_type(EntryType::Padding);

    const fn with_type(kind: EntryType) -> Self {
        let mut data = [0u8; ENTRY_SIZE];
        data[0] = kind as u8;
        Self(data)
    }

    pub(crate) fn entry_type(&self) -> Result<EntryType, StorageError> {
        EntryType::try_from(self.0[0])
            .map_err(|kind| StorageError::DataCorruption(format!("unknown entry type {kind}")))
    }

    fn expect_type(&self, index: u64, kind: EntryType) -> Result<(), StorageError> {
        if self.0[0] != kind as u8 {
            return Err(StorageError::DataCorruption(format!(
                "expected {kind:?} at entry {index} but was type {}",
                self.0[0]
            )));
        }
        Ok(())
    }

    fn read_u64(&self, at: usize) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[at..at + 8]);
        u64::from_le_bytes(buf)
    }

    fn read_u32(&self, at: usize) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.0[at..at + 4]);
        u32::from_le_bytes(buf)
    }
}

/// Position of a log: block number and index of the log within the block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct LogContext {
    pub(crate) block_number: u64,
    pub(crate) log_index: u32,
}

impl LogContext {
    pub(crate) const fn new(block_number: u64, log_index: u32) -> Self {
        Self { block_number, log_index }
    }
}

/// Decoded type 0 record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SearchCheckpoint {
    pub(crate) block_number: u64,
    pub(crate) log_index: u32,
    pub(crate) timestamp: u64,
}

impl SearchCheckpoint {
    pub(crate) fn encode(&self) -> Entry {
        let mut entry = Entry::with_type(EntryType::SearchCheckpoint);
        entry.0[1..9].copy_from_slice(&self.block_number.to_le_bytes());
        entry.0[9..13].copy_from_slice(&self.log_index.to_le_bytes());
        entry.0[13..21].copy_from_slice(&self.timestamp.to_le_bytes());
        entry
    }

    pub(crate) fn decode(index: u64, entry: &Entry) -> Result<Self, StorageError> {
        entry.expect_type(index, EntryType::SearchCheckpoint)?;
        Ok(Self {
            block_number: entry.read_u64(1),
            log_index: entry.read_u32(9),
            timestamp: entry.read_u64(13),
        })
    }

    pub(crate) const fn context(&self) -> LogContext {
        LogContext::new(self.block_number, self.log_index)
    }
}

pub(crate) fn encode_canonical_hash(hash: &TruncatedHash) -> Entry {
    let mut entry = Entry::with_type(EntryType::CanonicalHash);
    entry.0[1..21].copy_from_slice(hash.as_slice());
    entry
}

pub(crate) fn decode_canonical_hash(
    index: u64,
    entry: &Entry,
) -> Result<TruncatedHash, StorageError> {
    entry.expect_type(index, EntryType::CanonicalHash)?;
    Ok(TruncatedHash::from_slice(&entry.0[1..21]))
}

/// Decoded type 2 record. Positions are stored relative to the previous log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InitiatingEvent {
    pub(crate) block_diff: u8,
    pub(crate) increments_log_index: bool,
    pub(crate) hash: TruncatedHash,
}

impl InitiatingEvent {
    /// Computes the record that moves `prev` to `next`.
    ///
    /// Fails when more than [`u8::MAX`] blocks separate the two, the caller has to start a new
    /// checkpoint at `next` instead.
    pub(crate) fn between(
        prev: LogContext,
        next: LogContext,
        hash: TruncatedHash,
    ) -> Result<Self, StorageError> {
        let out_of_order = || {
            StorageError::LogOutOfOrder(format!(
                "cannot move from log {} of block {} to log {} of block {}",
                prev.log_index, prev.block_number, next.log_index, next.block_number
            ))
        };
        let block_diff =
            next.block_number.checked_sub(prev.block_number).ok_or_else(out_of_order)?;
        let block_diff = u8::try_from(block_diff).map_err(|_| {
            StorageError::LogOutOfOrder(format!(
                "too many blocks skipped between {} and {}",
                prev.block_number, next.block_number
            ))
        })?;
        let current_log_index = if block_diff > 0 { 0 } else { prev.log_index };
        let log_diff = next.log_index.checked_sub(current_log_index).ok_or_else(out_of_order)?;
        if log_diff > 1 {
            return Err(StorageError::LogOutOfOrder(format!(
                "skipped logs between {current_log_index} and {}",
                next.log_index
            )));
        }
        Ok(Self { block_diff, increments_log_index: log_diff > 0, hash })
    }

    pub(crate) fn encode(&self) -> Entry {
        let mut entry = Entry::with_type(EntryType::InitiatingEvent);
        entry.0[1] = self.block_diff;
        entry.0[2] = if self.increments_log_index { FLAG_INCREMENT_LOG_INDEX } else { 0 };
        entry.0[3..23].copy_from_slice(self.hash.as_slice());
        entry
    }

    pub(crate) fn decode(index: u64, entry: &Entry) -> Result<Self, StorageError> {
        entry.expect_type(index, EntryType::InitiatingEvent)?;
        Ok(Self {
            block_diff: entry.0[1],
            increments_log_index: entry.0[2] & FLAG_INCREMENT_LOG_INDEX != 0,
            hash: TruncatedHash::from_slice(&entry.0[3..23]),
        })
    }

    /// Position of this log given the position of the previous one.
    pub(crate) fn apply(&self, prev: LogContext) -> LogContext {
        let mut next = prev;
        if self.block_diff > 0 {
            next.block_number += u64::from(self.block_diff);
            next.log_index = 0;
        }
        if self.increments_log_index {
            next.log_index += 1;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_layout() {
        let checkpoint = SearchCheckpoint { block_number: 0x0102, log_index: 3, timestamp: 9 };
        let entry = checkpoint.encode();

        assert_eq!(entry.0[0], 0);
        assert_eq!(&entry.0[1..9], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&entry.0[9..13], &[3, 0, 0, 0]);
        assert_eq!(entry.0[13], 9);
        assert_eq!(&entry.0[21..], &[0, 0, 0]);
        assert_eq!(SearchCheckpoint::decode(0, &entry).unwrap(), checkpoint);
    }

    #[test]
    fn test_decode_wrong_type_is_corruption() {
        let entry = encode_canonical_hash(&TruncatedHash::repeat_byte(1));
        let err = SearchCheckpoint::decode(256, &entry).unwrap_err();
        assert!(matches!(err, StorageError::DataCorruption(_)));

        let unknown = Entry([9u8; ENTRY_SIZE]);
        assert!(matches!(unknown.entry_type(), Err(StorageError::DataCorruption(_))));
    }

    #[test]
    fn test_initiating_event_positions() {
        let hash = TruncatedHash::repeat_byte(7);

        // directly after a checkpoint: same position, no flag
        let at = LogContext::new(5, 2);
        let evt = InitiatingEvent::between(at, at, hash).unwrap();
        assert!(!evt.increments_log_index);
        assert_eq!(evt.apply(at), at);

        // next log in the same block
        let evt = InitiatingEvent::between(at, LogContext::new(5, 3), hash).unwrap();
        assert!(evt.increments_log_index);
        assert_eq!(evt.apply(at), LogContext::new(5, 3));

        // first log of a later block
        let evt = InitiatingEvent::between(at, LogContext::new(8, 0), hash).unwrap();
        assert_eq!(evt.block_diff, 3);
        assert_eq!(evt.apply(at), LogContext::new(8, 0));

        let decoded = InitiatingEvent::decode(1, &evt.encode()).unwrap();
        assert_eq!(decoded, evt);
    }

    #[test]
    fn test_initiating_event_gaps_rejected() {
        let hash = TruncatedHash::ZERO;
        let at = LogContext::new(1, 0);

        assert!(matches!(
            InitiatingEvent::between(at, LogContext::new(1, 2), hash),
            Err(StorageError::LogOutOfOrder(_))
        ));
        assert!(matches!(
            InitiatingEvent::between(at, LogContext::new(300, 0), hash),
            Err(StorageError::LogOutOfOrder(_))
        ));
    }
}
