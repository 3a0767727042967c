use containers::{double_sha256, Bytes32, MerkleBlock};

use super::config::MAX_TRANSACTIONS_PER_BLOCK;
use crate::error::ValidationError;

/// Checks the partial merkle tree of a `merkleblock` (BIP 37) and extracts the
/// transaction hashes it proves.
#[derive(Debug, Clone, Copy)]
pub struct MerkleValidator {
    max_transactions: u32,
}

impl Default for MerkleValidator {
    fn default() -> Self {
        Self {
            max_transactions: MAX_TRANSACTIONS_PER_BLOCK,
        }
    }
}

struct Traversal<'a> {
    total: u32,
    hashes: &'a [Bytes32],
    flags: &'a [u8],
    bits_used: usize,
    hashes_used: usize,
    matched: Vec<Bytes32>,
}

impl Traversal<'_> {
    fn tree_width(&self, height: u32) -> u32 {
        ((self.total as u64 + (1u64 << height) - 1) >> height) as u32
    }

    fn next_bit(&mut self) -> Result<bool, ValidationError> {
        if self.bits_used >= self.flags.len() * 8 {
            return Err(ValidationError::NotEnoughBits);
        }
        let bit = (self.flags[self.bits_used / 8] >> (self.bits_used % 8)) & 1 == 1;
        self.bits_used += 1;
        Ok(bit)
    }

    fn next_hash(&mut self) -> Result<Bytes32, ValidationError> {
        let hash = self
            .hashes
            .get(self.hashes_used)
            .copied()
            .ok_or(ValidationError::NotEnoughHashes)?;
        self.hashes_used += 1;
        Ok(hash)
    }

    fn traverse(&mut self, height: u32, position: u32) -> Result<Bytes32, ValidationError> {
        let parent_of_match = self.next_bit()?;

        if height == 0 || !parent_of_match {
            let hash = self.next_hash()?;
            if height == 0 && parent_of_match {
                self.matched.push(hash);
            }
            return Ok(hash);
        }

        let left = self.traverse(height - 1, position * 2)?;
        let right = if position * 2 + 1 < self.tree_width(height - 1) {
            let right = self.traverse(height - 1, position * 2 + 1)?;
            if right == left {
                return Err(ValidationError::DuplicatedLeftOrRightBranches);
            }
            right
        } else {
            left
        };

        let mut concatenated = [0u8; 64];
        concatenated[..32].copy_from_slice(&left.0);
        concatenated[32..].copy_from_slice(&right.0);
        Ok(double_sha256(&concatenated))
    }
}

impl MerkleValidator {
    pub fn new(max_transactions: u32) -> Self {
        Self { max_transactions }
    }

    /// Validate the proof against the header merkle root and return the
    /// matched transaction hashes in block order.
    pub fn validate(&self, merkle_block: &MerkleBlock) -> Result<Vec<Bytes32>, ValidationError> {
        let total = merkle_block.total_transactions;

        if total == 0 {
            return Err(ValidationError::NoTransactions);
        }
        if total > self.max_transactions {
            return Err(ValidationError::TooManyTransactions);
        }
        if merkle_block.hashes.len() > total as usize {
            return Err(ValidationError::MoreHashesThanTransactions);
        }
        if merkle_block.flags.len() * 8 < merkle_block.hashes.len() {
            return Err(ValidationError::NotEnoughBits);
        }

        let mut traversal = Traversal {
            total,
            hashes: &merkle_block.hashes,
            flags: &merkle_block.flags,
            bits_used: 0,
            hashes_used: 0,
            matched: Vec::new(),
        };

        let mut height = 0;
        while traversal.tree_width(height) > 1 {
            height += 1;
        }

        let root = traversal.traverse(height, 0)?;

        if (traversal.bits_used + 7) / 8 != merkle_block.flags.len() {
            return Err(ValidationError::UnnecessaryBits);
        }
        if traversal.hashes_used != merkle_block.hashes.len() {
            return Err(ValidationError::UnnecessaryHashes);
        }
        if root != merkle_block.header.merkle_root {
            return Err(ValidationError::WrongMerkleRoot);
        }

        Ok(traversal.matched)
    }
}
