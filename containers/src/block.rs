use crate::{double_sha256, Bytes32, Transaction};
use serde::{Deserialize, Serialize};

/// The 80-byte block header.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub version: i32,
    pub previous_block_hash: Bytes32,
    pub merkle_root: Bytes32,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub const SERIALIZED_SIZE: usize = 80;

    pub fn serialize(&self) -> [u8; Self::SERIALIZED_SIZE] {
        let mut out = [0u8; Self::SERIALIZED_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.previous_block_hash.0);
        out[36..68].copy_from_slice(&self.merkle_root.0);
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    pub fn header_hash(&self) -> Bytes32 {
        double_sha256(&self.serialize())
    }
}

/// A relevant point in chain history.
///
/// Created either by the initial bootstrap (height known from the history
/// index) or from a peer's `getblocks` answer (height unknown until the block
/// is downloaded). `sequence` is assigned by the store and orders the download
/// frontier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHash {
    pub header_hash: Bytes32,
    pub height: Option<u32>,
    pub sequence: u64,
}

impl BlockHash {
    pub fn new(header_hash: Bytes32, height: Option<u32>) -> Self {
        Self {
            header_hash,
            height,
            sequence: 0,
        }
    }

    pub fn with_height(header_hash: Bytes32, height: u32) -> Self {
        Self::new(header_hash, Some(height))
    }
}

/// A block that has been downloaded and connected, or the checkpoint itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub header_hash: Bytes32,
    pub height: u32,
    pub header: Option<BlockHeader>,
}

impl Block {
    pub fn new(header: BlockHeader, height: u32) -> Self {
        Self {
            header_hash: header.header_hash(),
            height,
            header: Some(header),
        }
    }

    /// A block known only by hash and height, such as a checkpoint.
    pub fn from_checkpoint(checkpoint: &crate::Checkpoint) -> Self {
        Self {
            header_hash: checkpoint.header_hash,
            height: checkpoint.height,
            header: None,
        }
    }
}

/// A block header with a partial merkle tree proving the inclusion of the
/// transactions that matched our bloom filter.
///
/// `transactions` is filled as the matched transactions arrive after the
/// `merkleblock` message.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleBlock {
    pub header: BlockHeader,
    pub total_transactions: u32,
    pub hashes: Vec<Bytes32>,
    pub flags: Vec<u8>,
    pub transaction_hashes: Vec<Bytes32>,
    pub transactions: Vec<Transaction>,
    pub height: Option<u32>,
}

impl MerkleBlock {
    pub fn new(
        header: BlockHeader,
        total_transactions: u32,
        hashes: Vec<Bytes32>,
        flags: Vec<u8>,
        transaction_hashes: Vec<Bytes32>,
    ) -> Self {
        Self {
            header,
            total_transactions,
            hashes,
            flags,
            transaction_hashes,
            transactions: Vec::new(),
            height: None,
        }
    }

    pub fn header_hash(&self) -> Bytes32 {
        self.header.header_hash()
    }

    /// All matched transactions have been received.
    pub fn is_complete(&self) -> bool {
        self.transaction_hashes
            .iter()
            .all(|hash| self.transactions.iter().any(|tx| tx.hash == *hash))
    }

    pub fn is_matching(&self, transaction_hash: &Bytes32) -> bool {
        self.transaction_hashes.contains(transaction_hash)
    }
}
