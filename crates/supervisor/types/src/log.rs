use crate::{BlockRef, message::ExecutingMessage};
use alloy_primitives::B256;
use std::collections::BTreeMap;

/// A reference entry representing a log observed in an L2 receipt.
///
/// This struct does **not** store the actual log content. Instead:
/// - `index` is the position of the log within its block.
/// - `hash` identifies the log and is what the log database persists.
/// - `executing_message` is present if the log executes a message from another log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    /// The index of the log.
    pub index: u32,
    /// The hash of the log, derived from the log address and payload.
    pub hash: B256,
    /// The parsed message, if the log is an executing message.
    pub executing_message: Option<ExecutingMessage>,
}

impl Log {
    /// Creates a plain initiating log.
    pub const fn new(index: u32, hash: B256) -> Self {
        Self { index, hash, executing_message: None }
    }

    /// Creates a log that executes `message`.
    pub const fn executing(index: u32, hash: B256, message: ExecutingMessage) -> Self {
        Self { index, hash, executing_message: Some(message) }
    }
}

/// A sealed block together with the facts the cross-chain checks need about its logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenedBlock {
    /// The sealed block.
    pub block: BlockRef,
    /// Number of logs emitted in the block.
    pub log_count: u32,
    /// Executing messages of the block, keyed by log index.
    pub executing_messages: BTreeMap<u32, ExecutingMessage>,
}

impl OpenedBlock {
    /// Executing messages in log order.
    pub fn messages(&self) -> impl Iterator<Item = &ExecutingMessage> {
        self.executing_messages.values()
    }
}
