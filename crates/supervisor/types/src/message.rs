use crate::ChainIndex;
use alloy_primitives::B256;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// A parsed executing message, referencing an initiating log on some chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[display("chain {chain} block {block_number} log {log_index} at {timestamp}")]
pub struct ExecutingMessage {
    /// Index of the chain holding the initiating log.
    pub chain: ChainIndex,
    /// The block number that contained the initiating log.
    pub block_number: u64,
    /// The log index within the block.
    pub log_index: u32,
    /// The timestamp of the block holding the initiating log.
    pub timestamp: u64,
    /// A unique hash identifying the initiating log (based on payload and origin).
    pub hash: B256,
}

impl ExecutingMessage {
    /// Returns the lookup that resolves the initiating log of this message.
    pub const fn contains_query(&self) -> ContainsQuery {
        ContainsQuery {
            timestamp: self.timestamp,
            block_number: self.block_number,
            log_index: self.log_index,
            log_hash: self.hash,
        }
    }
}

/// Query for the existence of a log at a given position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainsQuery {
    /// Expected timestamp of the block containing the log.
    pub timestamp: u64,
    /// Number of the block containing the log.
    pub block_number: u64,
    /// Index of the log within the block.
    pub log_index: u32,
    /// Hash of the log.
    pub log_hash: B256,
}
