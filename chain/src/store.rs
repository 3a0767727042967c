use std::collections::HashMap;

use anyhow::Result;
use containers::{Block, BlockHash, Bytes32, TransactionRecord, TransactionStatus};
use parking_lot::RwLock;

/// Persistent chain state shared by the wallet bootstrap and the peer group.
///
/// Implementations must make `add_block_hashes` atomic: either every new
/// record of the batch becomes visible or none does.
pub trait ChainStore: Send + Sync {
    fn restored(&self) -> bool;
    fn set_restored(&self, restored: bool) -> Result<()>;

    /// Append block hashes, skipping header hashes that are already known.
    /// Returns how many records were inserted.
    fn add_block_hashes(&self, hashes: Vec<BlockHash>) -> Result<usize>;
    fn block_hash(&self, header_hash: &Bytes32) -> Option<BlockHash>;
    /// Every block hash record in insertion order.
    fn block_hashes(&self) -> Vec<BlockHash>;
    /// Block hashes with no downloaded block yet, in insertion order.
    fn pending_block_hashes(&self, limit: usize) -> Vec<BlockHash>;
    /// How many pending block hashes have no known height.
    fn pending_unknown_height_count(&self) -> usize;
    /// The most recently added pending block hash with no known height.
    fn last_pending_unknown_height(&self) -> Option<BlockHash>;

    fn add_block(&self, block: Block) -> Result<()>;
    fn block(&self, header_hash: &Bytes32) -> Option<Block>;
    /// The stored block with the greatest height.
    fn last_block(&self) -> Option<Block>;
    /// Up to `limit` blocks at or below `height`, highest first.
    fn blocks_at_or_below(&self, height: u32, limit: usize) -> Vec<Block>;

    fn save_transaction(&self, record: TransactionRecord) -> Result<()>;
    fn transaction(&self, hash: &Bytes32) -> Option<TransactionRecord>;
    fn transactions_with_status(&self, status: TransactionStatus) -> Vec<TransactionRecord>;
}

#[derive(Default)]
struct Inner {
    restored: bool,
    block_hashes: Vec<BlockHash>,
    block_hash_index: HashMap<Bytes32, usize>,
    next_sequence: u64,
    blocks: HashMap<Bytes32, Block>,
    transactions: Vec<TransactionRecord>,
    transaction_index: HashMap<Bytes32, usize>,
}

/// In-memory `ChainStore` used by tests and light deployments.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainStore for MemoryStore {
    fn restored(&self) -> bool {
        self.inner.read().restored
    }

    fn set_restored(&self, restored: bool) -> Result<()> {
        self.inner.write().restored = restored;
        Ok(())
    }

    fn add_block_hashes(&self, hashes: Vec<BlockHash>) -> Result<usize> {
        let mut inner = self.inner.write();
        let mut inserted = 0;

        for mut hash in hashes {
            if inner.block_hash_index.contains_key(&hash.header_hash) {
                continue;
            }
            hash.sequence = inner.next_sequence;
            inner.next_sequence += 1;

            let position = inner.block_hashes.len();
            inner.block_hash_index.insert(hash.header_hash, position);
            inner.block_hashes.push(hash);
            inserted += 1;
        }

        Ok(inserted)
    }

    fn block_hash(&self, header_hash: &Bytes32) -> Option<BlockHash> {
        let inner = self.inner.read();
        inner
            .block_hash_index
            .get(header_hash)
            .map(|position| inner.block_hashes[*position].clone())
    }

    fn block_hashes(&self) -> Vec<BlockHash> {
        self.inner.read().block_hashes.clone()
    }

    fn pending_block_hashes(&self, limit: usize) -> Vec<BlockHash> {
        let inner = self.inner.read();
        inner
            .block_hashes
            .iter()
            .filter(|hash| !inner.blocks.contains_key(&hash.header_hash))
            .take(limit)
            .cloned()
            .collect()
    }

    fn pending_unknown_height_count(&self) -> usize {
        let inner = self.inner.read();
        inner
            .block_hashes
            .iter()
            .filter(|hash| hash.height.is_none() && !inner.blocks.contains_key(&hash.header_hash))
            .count()
    }

    fn last_pending_unknown_height(&self) -> Option<BlockHash> {
        let inner = self.inner.read();
        inner
            .block_hashes
            .iter()
            .rev()
            .find(|hash| hash.height.is_none() && !inner.blocks.contains_key(&hash.header_hash))
            .cloned()
    }

    fn add_block(&self, block: Block) -> Result<()> {
        self.inner.write().blocks.insert(block.header_hash, block);
        Ok(())
    }

    fn block(&self, header_hash: &Bytes32) -> Option<Block> {
        self.inner.read().blocks.get(header_hash).cloned()
    }

    fn last_block(&self) -> Option<Block> {
        self.inner
            .read()
            .blocks
            .values()
            .max_by_key(|block| block.height)
            .cloned()
    }

    fn blocks_at_or_below(&self, height: u32, limit: usize) -> Vec<Block> {
        let inner = self.inner.read();
        let mut blocks: Vec<Block> = inner
            .blocks
            .values()
            .filter(|block| block.height <= height)
            .cloned()
            .collect();
        blocks.sort_by(|a, b| b.height.cmp(&a.height));
        blocks.truncate(limit);
        blocks
    }

    fn save_transaction(&self, record: TransactionRecord) -> Result<()> {
        let mut inner = self.inner.write();
        let hash = record.hash();

        match inner.transaction_index.get(&hash).copied() {
            Some(position) => inner.transactions[position] = record,
            None => {
                let position = inner.transactions.len();
                inner.transaction_index.insert(hash, position);
                inner.transactions.push(record);
            }
        }

        Ok(())
    }

    fn transaction(&self, hash: &Bytes32) -> Option<TransactionRecord> {
        let inner = self.inner.read();
        inner
            .transaction_index
            .get(hash)
            .map(|position| inner.transactions[*position].clone())
    }

    fn transactions_with_status(&self, status: TransactionStatus) -> Vec<TransactionRecord> {
        self.inner
            .read()
            .transactions
            .iter()
            .filter(|record| record.status == status)
            .cloned()
            .collect()
    }
}
