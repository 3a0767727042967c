use std::sync::Arc;

use chain::{ChainStore, MemoryStore};
use containers::{Block, BlockHash, Checkpoint, Transaction, TransactionStatus};
use pretty_assertions::assert_eq;

use super::{
    checkpoint_hash, empty_merkle_block, hash, matched_merkle_block, memory_store, merkle_chain,
    RecordingListener, CHECKPOINT_HEIGHT,
};
use crate::error::ValidationError;
use crate::sync::{BlockSyncError, BlockSyncer, SyncState};

fn syncer(store: &Arc<MemoryStore>) -> (BlockSyncer, Arc<RecordingListener>) {
    let listener = Arc::new(RecordingListener::default());
    let syncer = BlockSyncer::new(
        store.clone(),
        Checkpoint::new(checkpoint_hash(), CHECKPOINT_HEIGHT),
        listener.clone(),
    )
    .unwrap();
    (syncer, listener)
}

#[test]
fn test_new_stores_checkpoint_block_once() {
    let store = memory_store();
    let (syncer, _) = syncer(&store);

    let block = store.block(&checkpoint_hash()).unwrap();
    assert_eq!(block.height, CHECKPOINT_HEIGHT);
    assert_eq!(syncer.local_known_best_block_height(), CHECKPOINT_HEIGHT);

    store
        .add_block(Block {
            header_hash: hash(1),
            height: 150,
            header: None,
        })
        .unwrap();
    let (syncer, _) = self::syncer(&store);
    assert_eq!(syncer.local_known_best_block_height(), 150);
}

#[test]
fn test_local_best_height_counts_unknown_height_hashes() {
    let store = memory_store();
    let (syncer, _) = syncer(&store);

    store
        .add_block_hashes(vec![BlockHash::with_height(hash(1), 90)])
        .unwrap();
    assert_eq!(syncer.add(vec![hash(2), hash(3)]).unwrap(), 2);

    assert_eq!(syncer.local_known_best_block_height(), CHECKPOINT_HEIGHT + 2);
}

#[test]
fn test_add_skips_known_hashes() {
    let store = memory_store();
    let (syncer, _) = syncer(&store);

    assert_eq!(syncer.add(vec![hash(1), hash(2)]).unwrap(), 2);
    assert_eq!(syncer.add(vec![hash(2), hash(3), checkpoint_hash()]).unwrap(), 1);

    assert!(!syncer.should_request_block(&hash(1)));
    assert!(!syncer.should_request_block(&checkpoint_hash()));
    assert!(syncer.should_request_block(&hash(4)));
}

#[test]
fn test_get_block_hashes_returns_pending_in_order() {
    let store = memory_store();
    let (syncer, _) = syncer(&store);
    syncer.add(vec![hash(3), hash(1), hash(2)]).unwrap();
    store
        .add_block(Block {
            header_hash: hash(1),
            height: 101,
            header: None,
        })
        .unwrap();

    let pending: Vec<_> = syncer
        .get_block_hashes()
        .into_iter()
        .map(|block_hash| block_hash.header_hash)
        .collect();
    assert_eq!(pending, vec![hash(3), hash(2)]);
}

#[test]
fn test_locator_with_only_checkpoint() {
    let store = memory_store();
    let (syncer, _) = syncer(&store);

    assert_eq!(syncer.get_block_locator_hashes(500), vec![checkpoint_hash()]);
}

#[test]
fn test_locator_uses_last_unknown_height_hash() {
    let store = memory_store();
    let (syncer, _) = syncer(&store);
    syncer.add(vec![hash(1), hash(2)]).unwrap();

    assert_eq!(
        syncer.get_block_locator_hashes(500),
        vec![hash(2), checkpoint_hash()]
    );
}

#[test]
fn test_locator_takes_ten_blocks_below_peer_height() {
    let store = memory_store();
    let (syncer, _) = syncer(&store);
    for offset in 1..=15u8 {
        store
            .add_block(Block {
                header_hash: hash(offset),
                height: CHECKPOINT_HEIGHT + offset as u32,
                header: None,
            })
            .unwrap();
    }

    let locator = syncer.get_block_locator_hashes(CHECKPOINT_HEIGHT + 12);

    let mut expected: Vec<_> = (3..=12u8).rev().map(hash).collect();
    expected.push(checkpoint_hash());
    assert_eq!(locator, expected);
}

#[test]
fn test_locator_skips_bootstrap_blocks_below_checkpoint() {
    let store = memory_store();
    let (syncer, _) = syncer(&store);
    for (byte, height) in [(1u8, 10), (2, 12), (3, 15)] {
        store
            .add_block_hashes(vec![BlockHash::with_height(hash(byte), height)])
            .unwrap();
        store
            .add_block(Block {
                header_hash: hash(byte),
                height,
                header: None,
            })
            .unwrap();
    }

    assert_eq!(
        syncer.get_block_locator_hashes(CHECKPOINT_HEIGHT + 50),
        vec![checkpoint_hash()]
    );
    assert_eq!(syncer.local_known_best_block_height(), CHECKPOINT_HEIGHT);
}

#[test]
fn test_locator_stops_at_checkpoint() {
    let store = memory_store();
    let (syncer, _) = syncer(&store);
    for (byte, height) in [(1u8, 15), (2, CHECKPOINT_HEIGHT + 1), (3, CHECKPOINT_HEIGHT + 2)] {
        store
            .add_block(Block {
                header_hash: hash(byte),
                height,
                header: None,
            })
            .unwrap();
    }

    assert_eq!(
        syncer.get_block_locator_hashes(CHECKPOINT_HEIGHT + 50),
        vec![hash(3), hash(2), checkpoint_hash()]
    );
}

#[test]
fn test_handle_connects_block_to_parent() {
    let store = memory_store();
    let (mut syncer, listener) = syncer(&store);
    let blocks = merkle_chain(checkpoint_hash(), 2);
    syncer
        .add(blocks.iter().map(|block| block.header_hash()).collect())
        .unwrap();

    assert_eq!(syncer.handle(blocks[0].clone(), 105).unwrap(), CHECKPOINT_HEIGHT + 1);
    assert_eq!(syncer.handle(blocks[1].clone(), 105).unwrap(), CHECKPOINT_HEIGHT + 2);

    assert_eq!(
        store.block(&blocks[1].header_hash()).unwrap().height,
        CHECKPOINT_HEIGHT + 2
    );
    assert!(syncer.get_block_hashes().is_empty());
    assert_eq!(
        *listener.heights.lock(),
        vec![(CHECKPOINT_HEIGHT + 2, 105), (CHECKPOINT_HEIGHT + 2, 105)]
    );
}

#[test]
fn test_handle_uses_known_height() {
    let store = memory_store();
    let (mut syncer, _) = syncer(&store);
    let block = empty_merkle_block(hash(0x42), 1);
    store
        .add_block_hashes(vec![BlockHash::with_height(block.header_hash(), 80)])
        .unwrap();

    assert_eq!(syncer.handle(block, 0).unwrap(), 80);
}

#[test]
fn test_handle_without_parent_fails() {
    let store = memory_store();
    let (mut syncer, _) = syncer(&store);
    let block = empty_merkle_block(hash(0x42), 1);

    let result = syncer.handle(block.clone(), 0);

    assert!(matches!(
        result,
        Err(BlockSyncError::Validation(ValidationError::NoPreviousBlock))
    ));
    assert!(store.block(&block.header_hash()).is_none());
}

#[test]
fn test_handle_rejects_invalid_proof() {
    let store = memory_store();
    let (mut syncer, _) = syncer(&store);
    let mut block = empty_merkle_block(checkpoint_hash(), 1);
    block.flags = vec![];

    assert!(matches!(
        syncer.handle(block, 0),
        Err(BlockSyncError::Validation(ValidationError::NotEnoughBits))
    ));
}

#[test]
fn test_handle_stores_matched_transactions_in_block() {
    let store = memory_store();
    let (mut syncer, _) = syncer(&store);
    let transaction = Transaction::new(vec![5, 5]);
    let mut block = matched_merkle_block(checkpoint_hash(), &transaction);
    block.transactions.push(transaction.clone());

    syncer.handle(block.clone(), 0).unwrap();

    let record = store.transaction(&transaction.hash).unwrap();
    assert_eq!(record.status, TransactionStatus::Relayed);
    assert_eq!(record.block_hash, Some(block.header_hash()));
}

#[test]
fn test_download_lifecycle() {
    let store = memory_store();
    let (mut syncer, _) = syncer(&store);
    assert_eq!(syncer.state(), SyncState::Idle);

    syncer.download_started();
    assert_eq!(syncer.state(), SyncState::Syncing);

    let block = merkle_chain(checkpoint_hash(), 1).remove(0);
    syncer.handle(block, 0).unwrap();
    syncer.download_iteration_completed();
    assert_eq!(syncer.blocks_in_round(), 1);

    syncer.download_completed();
    assert_eq!(syncer.state(), SyncState::Synced);

    syncer.download_started();
    syncer.download_failed();
    assert_eq!(syncer.state(), SyncState::Idle);
    assert_eq!(syncer.blocks_in_round(), 0);
}
