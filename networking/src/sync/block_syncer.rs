use std::sync::Arc;

use anyhow::Result;
use chain::ChainStore;
use containers::{
    Block, BlockHash, Bytes32, Checkpoint, MerkleBlock, TransactionRecord, TransactionStatus,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::{MAX_LOCATOR_BLOCKS, MAX_MERKLE_BLOCKS_PER_REQUEST};
use super::merkle_validator::MerkleValidator;
use super::states::SyncState;
use crate::error::ValidationError;
use crate::types::SyncStateListener;

#[derive(Debug, Error)]
pub enum BlockSyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Keeps the local chain view: which blocks are known, which still have to
/// be downloaded, and how far the local chain reaches.
pub struct BlockSyncer {
    store: Arc<dyn ChainStore>,
    checkpoint: Checkpoint,
    listener: Arc<dyn SyncStateListener>,
    validator: MerkleValidator,
    state: SyncState,
    blocks_in_round: usize,
}

impl BlockSyncer {
    /// Seeds the store with the checkpoint block when it holds no blocks yet.
    pub fn new(
        store: Arc<dyn ChainStore>,
        checkpoint: Checkpoint,
        listener: Arc<dyn SyncStateListener>,
    ) -> Result<Self> {
        if store.last_block().is_none() {
            store.add_block(Block::from_checkpoint(&checkpoint))?;
            info!(
                height = checkpoint.height,
                hash = %checkpoint.header_hash,
                "Stored checkpoint block"
            );
        }

        Ok(Self {
            store,
            checkpoint,
            listener,
            validator: MerkleValidator::default(),
            state: SyncState::default(),
            blocks_in_round: 0,
        })
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn blocks_in_round(&self) -> usize {
        self.blocks_in_round
    }

    /// Height of the best stored block plus the hashes queued behind it whose
    /// height is not known yet.
    pub fn local_known_best_block_height(&self) -> u32 {
        let last_height = self
            .store
            .last_block()
            .map_or(self.checkpoint.height, |block| block.height);

        let unknown_height = self.store.pending_unknown_height_count() as u32;

        last_height.saturating_add(unknown_height)
    }

    /// Block hashes still to be downloaded, oldest first.
    pub fn get_block_hashes(&self) -> Vec<BlockHash> {
        self.store.pending_block_hashes(MAX_MERKLE_BLOCKS_PER_REQUEST)
    }

    /// Hashes the sync peer continues from, newest first and always ending
    /// with the checkpoint. Blocks at or below the checkpoint are never
    /// offered, so a peer cannot answer with history the checkpoint covers.
    pub fn get_block_locator_hashes(&self, peer_last_block_height: u32) -> Vec<Bytes32> {
        let mut locator: Vec<Bytes32> = match self.store.last_pending_unknown_height() {
            Some(block_hash) => vec![block_hash.header_hash],
            None => self
                .store
                .blocks_at_or_below(peer_last_block_height, MAX_LOCATOR_BLOCKS)
                .into_iter()
                .take_while(|block| block.height > self.checkpoint.height)
                .map(|block| block.header_hash)
                .collect(),
        };

        locator.retain(|hash| *hash != self.checkpoint.header_hash);
        locator.push(self.checkpoint.header_hash);
        locator
    }

    /// Queue hashes announced by the sync peer. Returns how many were new.
    pub fn add(&self, hashes: Vec<Bytes32>) -> Result<usize> {
        let new_hashes: Vec<BlockHash> = hashes
            .into_iter()
            .filter(|hash| self.should_request_block(hash))
            .map(|hash| BlockHash::new(hash, None))
            .collect();

        if new_hashes.is_empty() {
            return Ok(0);
        }

        let inserted = self.store.add_block_hashes(new_hashes)?;
        debug!(inserted, "Block hashes added");
        Ok(inserted)
    }

    pub fn should_request_block(&self, hash: &Bytes32) -> bool {
        self.store.block_hash(hash).is_none() && self.store.block(hash).is_none()
    }

    /// Validate a merkle block, connect it to the local chain and store the
    /// transactions it carries.
    pub fn handle(
        &mut self,
        merkle_block: MerkleBlock,
        max_block_height: u32,
    ) -> Result<u32, BlockSyncError> {
        self.validator.validate(&merkle_block)?;

        let header_hash = merkle_block.header_hash();
        if let Some(block) = self.store.block(&header_hash) {
            debug!(block = %header_hash, height = block.height, "Merkle block already stored");
            return Ok(block.height);
        }

        let height = match merkle_block.height.or_else(|| {
            self.store
                .block_hash(&header_hash)
                .and_then(|block_hash| block_hash.height)
        }) {
            Some(height) => height,
            None => self
                .store
                .block(&merkle_block.header.previous_block_hash)
                .map(|parent| parent.height + 1)
                .ok_or(ValidationError::NoPreviousBlock)?,
        };

        self.store
            .add_block(Block::new(merkle_block.header.clone(), height))?;

        for transaction in merkle_block.transactions {
            let mut record = TransactionRecord::new(transaction, TransactionStatus::Relayed);
            record.block_hash = Some(header_hash);
            self.store.save_transaction(record)?;
        }

        self.blocks_in_round += 1;
        debug!(block = %header_hash, height, "Merkle block stored");

        self.listener
            .best_block_height_updated(self.local_known_best_block_height(), max_block_height);

        Ok(height)
    }

    pub fn download_started(&mut self) {
        self.transition(SyncState::Syncing);
        self.blocks_in_round = 0;
    }

    pub fn download_iteration_completed(&mut self) {
        debug!(blocks = self.blocks_in_round, "Download iteration completed");
    }

    pub fn download_completed(&mut self) {
        self.transition(SyncState::Synced);
        info!(
            blocks = self.blocks_in_round,
            height = self.local_known_best_block_height(),
            "Download round completed"
        );
    }

    pub fn download_failed(&mut self) {
        self.transition(SyncState::Idle);
        warn!(blocks = self.blocks_in_round, "Download round failed");
        self.blocks_in_round = 0;
    }

    fn transition(&mut self, target: SyncState) {
        if self.state == target {
            return;
        }
        if !self.state.can_transition_to(target) {
            warn!(from = ?self.state, to = ?target, "Unexpected sync state transition");
        }
        self.state = target;
    }
}
