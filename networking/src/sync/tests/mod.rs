mod block_syncer_tests;
mod peer_group_tests;

use std::sync::Arc;

use chain::{MemoryStore, NetworkParams};
use containers::{
    double_sha256, BlockHeader, Bytes32, Checkpoint, MerkleBlock, Transaction,
};
use parking_lot::Mutex;

use crate::error::PeerGroupError;
use crate::types::{OutboundMessage, PeerTransport, SyncStateListener};

pub(super) const CHECKPOINT_HEIGHT: u32 = 100;

pub(super) fn hash(byte: u8) -> Bytes32 {
    Bytes32([byte; 32])
}

pub(super) fn checkpoint_hash() -> Bytes32 {
    hash(0xcc)
}

pub(super) fn test_network(seeds: &[&str]) -> NetworkParams {
    NetworkParams {
        checkpoint: Checkpoint::new(checkpoint_hash(), CHECKPOINT_HEIGHT),
        seed_hosts: seeds.iter().map(|seed| seed.to_string()).collect(),
        ..NetworkParams::reg_test()
    }
}

pub(super) fn merkle_root(left: Bytes32, right: Bytes32) -> Bytes32 {
    let mut concatenated = [0u8; 64];
    concatenated[..32].copy_from_slice(&left.0);
    concatenated[32..].copy_from_slice(&right.0);
    double_sha256(&concatenated)
}

pub(super) fn header(previous_block_hash: Bytes32, merkle_root: Bytes32) -> BlockHeader {
    BlockHeader {
        version: 2,
        previous_block_hash,
        merkle_root,
        timestamp: 1_600_000_000,
        bits: 0x1d00ffff,
        nonce: 0,
    }
}

/// A one-transaction block whose only transaction did not match the filter.
pub(super) fn empty_merkle_block(previous_block_hash: Bytes32, seed: u8) -> MerkleBlock {
    let coinbase = double_sha256(&[seed]);
    MerkleBlock::new(header(previous_block_hash, coinbase), 1, vec![coinbase], vec![0x00], vec![])
}

/// A one-transaction block whose only transaction matched the filter.
pub(super) fn matched_merkle_block(previous_block_hash: Bytes32, transaction: &Transaction) -> MerkleBlock {
    MerkleBlock::new(
        header(previous_block_hash, transaction.hash),
        1,
        vec![transaction.hash],
        vec![0x01],
        vec![],
    )
}

/// A chain of `count` empty merkle blocks on top of `parent`.
pub(super) fn merkle_chain(parent: Bytes32, count: u8) -> Vec<MerkleBlock> {
    let mut blocks = Vec::new();
    let mut previous = parent;
    for seed in 0..count {
        let block = empty_merkle_block(previous, seed);
        previous = block.header_hash();
        blocks.push(block);
    }
    blocks
}

pub(super) fn ping_nonces(messages: &[OutboundMessage]) -> Vec<u64> {
    messages
        .iter()
        .filter_map(|message| match message {
            OutboundMessage::Ping(nonce) => Some(*nonce),
            _ => None,
        })
        .collect()
}

#[derive(Default)]
pub(super) struct MockTransport {
    pub connected: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<(String, OutboundMessage)>>,
    pub disconnected: Mutex<Vec<(String, Option<PeerGroupError>)>>,
}

impl MockTransport {
    pub fn sent_to(&self, host: &str) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| to == host)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn take_sent_to(&self, host: &str) -> Vec<OutboundMessage> {
        let mut sent = self.sent.lock();
        let (taken, kept): (Vec<_>, Vec<_>) = sent.drain(..).partition(|(to, _)| to == host);
        *sent = kept;
        taken.into_iter().map(|(_, message)| message).collect()
    }

    pub fn commands_to(&self, host: &str) -> Vec<&'static str> {
        self.sent_to(host).iter().map(|message| message.command()).collect()
    }
}

impl PeerTransport for MockTransport {
    fn connect(&self, host: &str) {
        self.connected.lock().push(host.to_string());
    }

    fn send(&self, host: &str, message: OutboundMessage) {
        self.sent.lock().push((host.to_string(), message));
    }

    fn disconnect(&self, host: &str, error: Option<PeerGroupError>) {
        self.disconnected.lock().push((host.to_string(), error));
    }
}

#[derive(Default)]
pub(super) struct RecordingListener {
    pub finished: Mutex<usize>,
    pub heights: Mutex<Vec<(u32, u32)>>,
}

impl SyncStateListener for RecordingListener {
    fn sync_finished(&self) {
        *self.finished.lock() += 1;
    }

    fn best_block_height_updated(&self, height: u32, max_block_height: u32) {
        self.heights.lock().push((height, max_block_height));
    }
}

pub(super) fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}
