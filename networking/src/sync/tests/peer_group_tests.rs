use std::sync::Arc;

use chain::{ChainStore, MemoryStore};
use containers::{
    BlockHash, BloomFilter, InventoryItem, MerkleBlock, NetworkAddress, Transaction,
    TransactionStatus,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

use super::{
    checkpoint_hash, hash, memory_store, merkle_chain, ping_nonces, test_network, MockTransport,
    RecordingListener, CHECKPOINT_HEIGHT,
};
use crate::peer::Task;
use crate::error::{PeerGroupError, TransportError, ValidationError};
use crate::sync::{
    PeerGroup, PeerGroupConfig, PeerGroupDeps, PeerGroupHandle, SyncState,
    EXPECTED_HASHES_MIN_AT_TIP,
};
use crate::types::{InboundMessage, OutboundMessage, PeerGroupControl};

struct Harness {
    group: PeerGroup,
    handle: PeerGroupHandle,
    transport: Arc<MockTransport>,
    listener: Arc<RecordingListener>,
    store: Arc<MemoryStore>,
}

impl Harness {
    fn new(seeds: &[&str]) -> Self {
        Self::with_config(seeds, PeerGroupConfig::default())
    }

    fn with_config(seeds: &[&str], config: PeerGroupConfig) -> Self {
        let store = memory_store();
        let transport = Arc::new(MockTransport::default());
        let listener = Arc::new(RecordingListener::default());
        let deps = PeerGroupDeps {
            store: store.clone(),
            transport: transport.clone(),
            bloom_filters: Arc::new(Some(BloomFilter::new(vec![0xff; 4], 3, 7, 0))),
            reachability: Arc::new(true),
            listener: listener.clone(),
        };
        let group = PeerGroup::new(config, &test_network(seeds), deps).unwrap();
        let handle = group.handle();

        Self {
            group,
            handle,
            transport,
            listener,
            store,
        }
    }

    fn start(&mut self) {
        self.handle.start();
        self.group.process_pending();
    }

    fn connect(&mut self, host: &str, height: u32) {
        self.handle.peer_connected(host, height);
        self.group.process_pending();
    }

    fn receive(&mut self, host: &str, message: InboundMessage) {
        self.handle.peer_message(host, message);
        self.group.process_pending();
    }

    fn disconnected(&mut self, host: &str, error: Option<PeerGroupError>) {
        self.handle.peer_disconnected(host, error);
        self.group.process_pending();
    }

    fn sync_peer(&self) -> Option<String> {
        self.group.peer_manager().sync_peer().map(str::to_string)
    }

    fn connected_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .group
            .peer_manager()
            .connected()
            .map(|peer| peer.host().to_string())
            .collect();
        hosts.sort();
        hosts
    }

    /// `expected_min` of each block hashes task queued on `host`.
    fn block_hashes_minimums(&self, host: &str) -> Vec<usize> {
        self.group
            .peer_manager()
            .get(host)
            .map(|peer| {
                peer.tasks()
                    .iter()
                    .filter_map(|task| match task {
                        Task::GetBlockHashes(task) => Some(task.expected_min()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn assert_sync_peer_is_connected(&self) {
        if let Some(sync_peer) = self.sync_peer() {
            assert!(
                self.connected_hosts().contains(&sync_peer),
                "sync peer {sync_peer} is not connected"
            );
        }
    }
}

fn block_inventory(blocks: &[MerkleBlock]) -> InboundMessage {
    InboundMessage::Inventory(
        blocks
            .iter()
            .map(|block| InventoryItem::block(block.header_hash()))
            .collect(),
    )
}

/// Walk a peer announcing two blocks above the checkpoint through a full
/// round, up to the sync peer being released.
fn sync_two_blocks(harness: &mut Harness, host: &str) -> Vec<MerkleBlock> {
    let blocks = merkle_chain(checkpoint_hash(), 2);
    harness.transport.take_sent_to(host);

    harness.receive(host, block_inventory(&blocks));
    let sent = harness.transport.take_sent_to(host);
    assert_eq!(
        sent.iter().map(|message| message.command()).collect::<Vec<_>>(),
        vec!["getdata", "ping", "getblocks", "ping"]
    );
    let block_hashes_nonce = ping_nonces(&sent)[1];

    for block in &blocks {
        harness.receive(host, InboundMessage::MerkleBlock(block.clone()));
    }
    assert_eq!(harness.sync_peer().as_deref(), Some(host));

    harness.receive(host, InboundMessage::Pong(block_hashes_nonce));
    blocks
}

#[test]
fn test_start_dials_up_to_max_peers() {
    let config = PeerGroupConfig {
        max_peers: 2,
        ..PeerGroupConfig::default()
    };
    let mut harness = Harness::with_config(&["a", "b", "c"], config);

    harness.start();

    assert!(harness.group.is_started());
    assert_eq!(*harness.transport.connected.lock(), vec!["a", "b"]);
    assert_eq!(harness.group.peer_manager().total_peers_count(), 2);
}

#[test]
fn test_start_is_idempotent() {
    let mut harness = Harness::new(&["a"]);

    harness.start();
    harness.start();

    assert_eq!(*harness.transport.connected.lock(), vec!["a"]);
}

#[test]
fn test_stop_disconnects_every_peer() {
    let mut harness = Harness::new(&["a", "b"]);
    harness.start();
    harness.connect("a", CHECKPOINT_HEIGHT);

    harness.handle.stop();
    harness.group.process_pending();

    assert!(!harness.group.is_started());
    assert_eq!(
        *harness.transport.disconnected.lock(),
        vec![("a".to_string(), None), ("b".to_string(), None)]
    );
}

#[test]
fn test_connect_loads_filter_and_elects_sync_peer() {
    let mut harness = Harness::new(&["a"]);
    harness.start();

    harness.connect("a", CHECKPOINT_HEIGHT + 2);

    assert_eq!(harness.sync_peer().as_deref(), Some("a"));
    assert_eq!(harness.group.block_syncer().state(), SyncState::Syncing);

    let sent = harness.transport.sent_to("a");
    assert_eq!(
        sent.iter().map(|message| message.command()).collect::<Vec<_>>(),
        vec!["filterload", "getblocks", "ping"]
    );
    assert_eq!(
        sent[1],
        OutboundMessage::GetBlocks {
            locator: vec![checkpoint_hash()]
        }
    );
}

#[test]
fn test_full_sync_round() {
    let mut harness = Harness::new(&["a"]);
    harness.start();
    harness.connect("a", CHECKPOINT_HEIGHT + 2);

    let blocks = sync_two_blocks(&mut harness, "a");

    for (offset, block) in blocks.iter().enumerate() {
        let stored = harness.store.block(&block.header_hash()).unwrap();
        assert_eq!(stored.height, CHECKPOINT_HEIGHT + 1 + offset as u32);
    }
    assert_eq!(*harness.listener.finished.lock(), 1);
    assert_eq!(harness.transport.commands_to("a"), vec!["mempool"]);
    assert_eq!(harness.sync_peer(), None);
    assert_eq!(harness.group.block_syncer().state(), SyncState::Synced);

    let peer = harness.group.peer_manager().get("a").unwrap();
    assert!(peer.synced);
    assert!(peer.block_hashes_synced);
}

#[test]
fn test_invalid_merkle_block_drops_peer() {
    let mut harness = Harness::new(&["a"]);
    harness.start();
    harness.connect("a", CHECKPOINT_HEIGHT + 2);

    let blocks = merkle_chain(checkpoint_hash(), 2);
    harness.receive("a", block_inventory(&blocks));

    let mut invalid = blocks[0].clone();
    invalid.flags = vec![];
    harness.receive("a", InboundMessage::MerkleBlock(invalid.clone()));

    assert_eq!(
        *harness.transport.disconnected.lock(),
        vec![(
            "a".to_string(),
            Some(PeerGroupError::Validation(ValidationError::NotEnoughBits))
        )]
    );
    assert!(harness.store.block(&invalid.header_hash()).is_none());

    harness.disconnected(
        "a",
        Some(PeerGroupError::Validation(ValidationError::NotEnoughBits)),
    );
    assert_eq!(harness.sync_peer(), None);
    assert_eq!(harness.group.block_syncer().state(), SyncState::Idle);
    assert!(harness.group.peer_manager().get("a").is_none());
}

#[test]
fn test_dropping_sync_peer_hands_over_before_transport_reports() {
    let mut harness = Harness::new(&["a", "b"]);
    harness.start();
    harness.connect("a", CHECKPOINT_HEIGHT + 2);
    harness.connect("b", CHECKPOINT_HEIGHT + 2);
    assert_eq!(harness.sync_peer().as_deref(), Some("a"));

    let blocks = merkle_chain(checkpoint_hash(), 2);
    harness.receive("a", block_inventory(&blocks));
    let mut invalid = blocks[0].clone();
    invalid.flags = vec![];
    harness.receive("a", InboundMessage::MerkleBlock(invalid));

    assert_eq!(harness.connected_hosts(), vec!["b"]);
    assert_eq!(harness.sync_peer().as_deref(), Some("b"));
    harness.assert_sync_peer_is_connected();
    assert_eq!(
        harness.transport.commands_to("b"),
        vec!["filterload", "getdata", "ping", "getblocks", "ping"]
    );

    harness.disconnected(
        "a",
        Some(PeerGroupError::Validation(ValidationError::NotEnoughBits)),
    );
    assert_eq!(harness.sync_peer().as_deref(), Some("b"));
    harness.assert_sync_peer_is_connected();
}

#[test]
fn test_stop_releases_sync_peer() {
    let mut harness = Harness::new(&["a"]);
    harness.start();
    harness.connect("a", CHECKPOINT_HEIGHT + 2);
    assert_eq!(harness.sync_peer().as_deref(), Some("a"));

    harness.handle.stop();
    harness.group.process_pending();

    assert_eq!(harness.sync_peer(), None);
    assert_eq!(harness.group.block_syncer().state(), SyncState::Idle);
}

#[test]
fn test_connect_after_stop_is_ignored() {
    let mut harness = Harness::new(&["a"]);
    harness.start();
    harness.handle.stop();
    harness.group.process_pending();

    harness.connect("a", CHECKPOINT_HEIGHT + 2);

    assert!(harness.connected_hosts().is_empty());
    assert_eq!(harness.sync_peer(), None);
    assert!(harness.transport.sent.lock().is_empty());
}

#[rstest]
#[case::at_tip(true, CHECKPOINT_HEIGHT, vec![EXPECTED_HASHES_MIN_AT_TIP])]
#[case::ahead_with_pending(true, CHECKPOINT_HEIGHT + 5, vec![5])]
#[case::behind_with_pending(true, CHECKPOINT_HEIGHT - 10, vec![0])]
#[case::ahead(false, CHECKPOINT_HEIGHT + 5, vec![5])]
#[case::behind(false, CHECKPOINT_HEIGHT - 10, vec![0])]
fn test_block_hashes_expected_minimum(
    #[case] with_pending: bool,
    #[case] peer_height: u32,
    #[case] expected: Vec<usize>,
) {
    let mut harness = Harness::new(&["a"]);
    if with_pending {
        harness
            .store
            .add_block_hashes(vec![BlockHash::with_height(hash(1), 50)])
            .unwrap();
    }
    harness.start();

    harness.connect("a", peer_height);

    assert_eq!(harness.sync_peer().as_deref(), Some("a"));
    assert_eq!(harness.block_hashes_minimums("a"), expected);
    assert_eq!(
        harness.transport.commands_to("a").contains(&"getdata"),
        with_pending
    );
}

#[test]
fn test_sync_peer_disconnect_elects_another_peer() {
    let mut harness = Harness::new(&["a", "b"]);
    harness.start();
    harness.connect("a", CHECKPOINT_HEIGHT + 2);
    harness.connect("b", CHECKPOINT_HEIGHT + 2);
    assert_eq!(harness.sync_peer().as_deref(), Some("a"));
    assert_eq!(harness.transport.commands_to("b"), vec!["filterload"]);

    harness.disconnected("a", None);

    assert_eq!(harness.sync_peer().as_deref(), Some("b"));
    assert_eq!(
        harness.transport.commands_to("b"),
        vec!["filterload", "getblocks", "ping"]
    );
    assert_eq!(harness.group.host_manager().score("a"), 1);
}

#[test]
fn test_only_one_sync_peer_at_a_time() {
    let mut harness = Harness::new(&["a", "b", "c"]);
    harness.start();
    for host in ["a", "b", "c"] {
        harness.connect(host, CHECKPOINT_HEIGHT + 2);
    }

    let syncing: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .filter(|host| harness.transport.commands_to(host).contains(&"getblocks"))
        .collect();
    assert_eq!(syncing, vec!["a"]);
}

#[test]
fn test_unknown_block_announcement_restarts_sync() {
    let mut harness = Harness::new(&["a"]);
    harness.start();
    harness.connect("a", CHECKPOINT_HEIGHT + 2);
    let blocks = sync_two_blocks(&mut harness, "a");
    harness.transport.take_sent_to("a");

    harness.receive("a", block_inventory(&blocks[1..]));
    assert_eq!(harness.sync_peer(), None);
    assert!(harness.transport.sent_to("a").is_empty());

    let next = merkle_chain(blocks[1].header_hash(), 1);
    harness.receive("a", block_inventory(&next));

    assert_eq!(harness.sync_peer().as_deref(), Some("a"));
    assert!(!harness.group.peer_manager().get("a").unwrap().block_hashes_synced);
    assert_eq!(harness.transport.commands_to("a"), vec!["getblocks", "ping"]);
}

#[test]
fn test_transaction_inventory_is_requested_once() {
    let mut harness = Harness::new(&["a", "b"]);
    harness.start();
    harness.connect("a", CHECKPOINT_HEIGHT);
    harness.connect("b", CHECKPOINT_HEIGHT);
    harness.transport.sent.lock().clear();

    let transaction = Transaction::new(vec![0xab; 8]);
    let announcement = InboundMessage::Inventory(vec![InventoryItem::transaction(transaction.hash)]);

    harness.receive("a", announcement.clone());
    harness.receive("b", announcement);

    assert_eq!(harness.transport.commands_to("a"), vec!["getdata", "ping"]);
    assert!(harness.transport.sent_to("b").is_empty());

    harness.receive("a", InboundMessage::Transaction(transaction.clone()));

    let record = harness.store.transaction(&transaction.hash).unwrap();
    assert_eq!(record.status, TransactionStatus::Relayed);
    assert_eq!(harness.group.peer_manager().get("a").unwrap().tasks().len(), 1);
}

#[test]
fn test_send_transaction_to_ready_peer() {
    let mut harness = Harness::new(&["a", "b"]);
    harness.start();
    harness.connect("a", CHECKPOINT_HEIGHT + 2);
    harness.connect("b", CHECKPOINT_HEIGHT + 2);
    harness.transport.sent.lock().clear();

    let transaction = Transaction::new(vec![1, 2, 3, 4]);
    harness.handle.send_transaction(transaction.clone());
    harness.group.process_pending();

    // the sync peer is busy, so only "b" gets the announcement
    assert!(harness.transport.sent_to("a").is_empty());
    assert_eq!(
        harness.transport.take_sent_to("b"),
        vec![OutboundMessage::Inventory(vec![InventoryItem::transaction(
            transaction.hash
        )])]
    );
    assert_eq!(
        harness.store.transaction(&transaction.hash).unwrap().status,
        TransactionStatus::New
    );

    harness.receive(
        "b",
        InboundMessage::GetData(vec![InventoryItem::transaction(transaction.hash)]),
    );

    assert_eq!(
        harness.transport.sent_to("b"),
        vec![OutboundMessage::Transaction(transaction.clone())]
    );
    assert_eq!(
        harness.store.transaction(&transaction.hash).unwrap().status,
        TransactionStatus::Sent
    );
}

#[test]
fn test_pending_transaction_sent_on_connect() {
    let mut harness = Harness::new(&["a"]);
    let transaction = Transaction::new(vec![9, 9]);
    harness.handle.send_transaction(transaction.clone());
    harness.start();
    assert!(harness.transport.sent.lock().is_empty());

    harness.connect("a", CHECKPOINT_HEIGHT + 2);
    assert_eq!(harness.transport.commands_to("a"), vec!["filterload", "inv"]);

    harness.receive(
        "a",
        InboundMessage::GetData(vec![InventoryItem::transaction(transaction.hash)]),
    );

    // the sync round starts once the announcement is answered
    assert_eq!(
        harness.transport.commands_to("a"),
        vec!["filterload", "inv", "tx", "getblocks", "ping"]
    );
    assert_eq!(
        harness.store.transaction(&transaction.hash).unwrap().status,
        TransactionStatus::Sent
    );
}

#[test]
fn test_timed_out_sync_peer_is_dropped() {
    let config = PeerGroupConfig {
        task_timeout_secs: 0,
        ..PeerGroupConfig::default()
    };
    let mut harness = Harness::with_config(&["a"], config);
    harness.start();
    harness.connect("a", CHECKPOINT_HEIGHT + 2);

    harness.handle.send(crate::sync::PeerGroupEvent::CheckTimeouts);
    harness.group.process_pending();

    assert_eq!(
        *harness.transport.disconnected.lock(),
        vec![(
            "a".to_string(),
            Some(PeerGroupError::Transport(TransportError::Timeout))
        )]
    );
}

#[test]
fn test_messages_from_unknown_peer_are_ignored() {
    let mut harness = Harness::new(&["a"]);
    harness.start();

    harness.receive("z", block_inventory(&merkle_chain(checkpoint_hash(), 1)));
    harness.receive("a", block_inventory(&merkle_chain(checkpoint_hash(), 1)));

    assert!(harness.transport.sent.lock().is_empty());
    assert_eq!(harness.sync_peer(), None);
}

#[test]
fn test_address_gossip_adds_hosts() {
    let mut harness = Harness::new(&["a"]);
    harness.start();
    harness.connect("a", CHECKPOINT_HEIGHT);

    harness.receive(
        "a",
        InboundMessage::Addresses(vec![
            NetworkAddress::new(1, "10.0.0.7", 18444),
            NetworkAddress::new(1, "a", 18444),
        ]),
    );

    assert_eq!(
        harness.group.host_manager().known_hosts(),
        &["10.0.0.7".to_string()]
    );
}

#[test]
fn test_failed_host_is_replaced_by_next_seed() {
    let config = PeerGroupConfig {
        max_peers: 1,
        ..PeerGroupConfig::default()
    };
    let mut harness = Harness::with_config(&["a", "b"], config);
    harness.start();

    harness.disconnected("a", Some(PeerGroupError::Transport(TransportError::Timeout)));

    assert_eq!(*harness.transport.connected.lock(), vec!["a", "b"]);
    assert_eq!(harness.group.host_manager().score("a"), -1);
    assert!(harness.group.peer_manager().get("a").is_none());
}

#[test]
fn test_bloom_filter_update_reaches_connected_peers() {
    let mut harness = Harness::new(&["a", "b"]);
    harness.start();
    harness.connect("a", CHECKPOINT_HEIGHT);
    harness.transport.sent.lock().clear();

    harness.handle.bloom_filter_updated();
    harness.group.process_pending();

    assert_eq!(harness.transport.commands_to("a"), vec!["filterload"]);
    assert!(harness.transport.sent_to("b").is_empty());
}
