//! Block identity types.
//!
//! A [`BlockSeal`] is the minimal identity of a sealed block on some chain, a [`BlockRef`]
//! additionally links the block to its parent.

use alloy_eips::BlockNumHash;
use alloy_primitives::B256;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Represents a sealed block with its hash, number, and timestamp.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[display("{hash}:{number}")]
#[serde(rename_all = "camelCase")]
pub struct BlockSeal {
    /// The block's hash
    pub hash: B256,
    /// The block number
    pub number: u64,
    /// The block's timestamp
    pub timestamp: u64,
}

impl BlockSeal {
    /// Creates a new [`BlockSeal`] with the given hash, number, and timestamp.
    pub const fn new(hash: B256, number: u64, timestamp: u64) -> Self {
        Self { hash, number, timestamp }
    }

    /// Returns the number and hash of the block.
    pub const fn id(&self) -> BlockNumHash {
        BlockNumHash { number: self.number, hash: self.hash }
    }

    /// Links the seal to its parent, producing a [`BlockRef`].
    ///
    /// Returns `None` when `parent` is not directly below this block.
    pub fn with_parent(&self, parent: &Self) -> Option<BlockRef> {
        (parent.number + 1 == self.number).then(|| BlockRef {
            hash: self.hash,
            number: self.number,
            parent_hash: parent.hash,
            timestamp: self.timestamp,
        })
    }
}

impl From<BlockRef> for BlockSeal {
    fn from(block: BlockRef) -> Self {
        block.seal()
    }
}

/// A block reference that also carries the hash of its parent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[display("{hash}:{number}")]
#[serde(rename_all = "camelCase")]
pub struct BlockRef {
    /// The block's hash
    pub hash: B256,
    /// The block number
    pub number: u64,
    /// The hash of the parent block
    pub parent_hash: B256,
    /// The block's timestamp
    pub timestamp: u64,
}

impl BlockRef {
    /// Creates a new [`BlockRef`].
    pub const fn new(hash: B256, number: u64, parent_hash: B256, timestamp: u64) -> Self {
        Self { hash, number, parent_hash, timestamp }
    }

    /// Returns the number and hash of the block.
    pub const fn id(&self) -> BlockNumHash {
        BlockNumHash { number: self.number, hash: self.hash }
    }

    /// Returns the number and hash of the parent block.
    ///
    /// The genesis block is its own parent.
    pub const fn parent_id(&self) -> BlockNumHash {
        BlockNumHash { number: self.number.saturating_sub(1), hash: self.parent_hash }
    }

    /// Drops the parent link.
    pub const fn seal(&self) -> BlockSeal {
        BlockSeal { hash: self.hash, number: self.number, timestamp: self.timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_block_ref_serialize_camel_case() {
        let block = BlockRef::new(B256::from([1u8; 32]), 7, B256::from([2u8; 32]), 1000);

        let json_str = serde_json::to_string(&block).unwrap();
        let v: Value = serde_json::from_str(&json_str).unwrap();

        assert!(v.get("parentHash").is_some());
        assert_eq!(v.get("number"), Some(&json!(7)));
        assert_eq!(v.get("timestamp"), Some(&json!(1000)));
    }

    #[test]
    fn test_with_parent() {
        let parent = BlockSeal::new(B256::from([1u8; 32]), 4, 10);
        let child = BlockSeal::new(B256::from([2u8; 32]), 5, 12);

        let linked = child.with_parent(&parent).unwrap();
        assert_eq!(linked.parent_hash, parent.hash);
        assert_eq!(linked.seal(), child);
        assert_eq!(linked.parent_id(), parent.id());

        assert!(parent.with_parent(&child).is_none());
    }
}
