//! The peer group actor.
//!
//! All sync state (peers, block and transaction syncers, host candidates) is
//! owned by one `PeerGroup` and mutated only while it drains its event queue.
//! Transports and the wallet talk to it through a cloneable
//! [`PeerGroupHandle`]. Handlers never run follow-up work inline; they push
//! follow-up events onto the same queue.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chain::{ChainStore, NetworkParams};
use containers::{Bytes32, InventoryItem, MerkleBlock, Transaction};
use metrics::SharedMetrics;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::block_syncer::{BlockSyncError, BlockSyncer};
use super::config::{PeerGroupConfig, EXPECTED_HASHES_MIN_AT_TIP};
use super::peer_host_manager::PeerHostManager;
use super::peer_manager::PeerManager;
use super::transaction_syncer::TransactionSyncer;
use crate::error::{PeerGroupError, TransportError};
use crate::peer::{Peer, Task, TaskCompletion};
use crate::seeds::SeedSource;
use crate::types::{
    BloomFilterProvider, ConnectionState, InboundMessage, NetworkReachability, OutboundMessage,
    PeerGroupControl, PeerTransport, SyncStateListener,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerGroupEvent {
    Start,
    Stop,
    SendTransaction(Transaction),
    BloomFilterUpdated,
    SendPendingTransactions,
    PeerConnected {
        host: String,
        announced_last_block_height: u32,
    },
    PeerDisconnected {
        host: String,
        error: Option<PeerGroupError>,
    },
    PeerMessage {
        host: String,
        message: InboundMessage,
    },
    PeerReady {
        host: String,
    },
    AssignSyncPeer,
    ConnectMissingPeers,
    CheckTimeouts,
}

/// Producer side of the peer group queue.
#[derive(Debug, Clone)]
pub struct PeerGroupHandle {
    sender: mpsc::UnboundedSender<PeerGroupEvent>,
}

impl PeerGroupHandle {
    pub fn send(&self, event: PeerGroupEvent) {
        if let Err(err) = self.sender.send(event) {
            warn!(event = ?err.0, "Peer group is gone, dropping event");
        }
    }

    pub fn send_transaction(&self, transaction: Transaction) {
        self.send(PeerGroupEvent::SendTransaction(transaction));
    }

    pub fn bloom_filter_updated(&self) {
        self.send(PeerGroupEvent::BloomFilterUpdated);
    }

    pub fn peer_connected(&self, host: impl Into<String>, announced_last_block_height: u32) {
        self.send(PeerGroupEvent::PeerConnected {
            host: host.into(),
            announced_last_block_height,
        });
    }

    pub fn peer_disconnected(&self, host: impl Into<String>, error: Option<PeerGroupError>) {
        self.send(PeerGroupEvent::PeerDisconnected {
            host: host.into(),
            error,
        });
    }

    pub fn peer_message(&self, host: impl Into<String>, message: InboundMessage) {
        self.send(PeerGroupEvent::PeerMessage {
            host: host.into(),
            message,
        });
    }
}

impl PeerGroupControl for PeerGroupHandle {
    fn start(&self) {
        self.send(PeerGroupEvent::Start);
    }

    fn stop(&self) {
        self.send(PeerGroupEvent::Stop);
    }
}

/// External collaborators of the peer group.
pub struct PeerGroupDeps {
    pub store: Arc<dyn ChainStore>,
    pub transport: Arc<dyn PeerTransport>,
    pub bloom_filters: Arc<dyn BloomFilterProvider>,
    pub reachability: Arc<dyn NetworkReachability>,
    pub listener: Arc<dyn SyncStateListener>,
}

pub struct PeerGroup {
    config: PeerGroupConfig,
    transport: Arc<dyn PeerTransport>,
    bloom_filters: Arc<dyn BloomFilterProvider>,
    reachability: Arc<dyn NetworkReachability>,
    listener: Arc<dyn SyncStateListener>,
    block_syncer: BlockSyncer,
    transaction_syncer: TransactionSyncer,
    peer_manager: PeerManager,
    host_manager: PeerHostManager,
    metrics: Option<SharedMetrics>,
    started: bool,
    sender: mpsc::UnboundedSender<PeerGroupEvent>,
    receiver: mpsc::UnboundedReceiver<PeerGroupEvent>,
}

impl PeerGroup {
    pub fn new(config: PeerGroupConfig, network: &NetworkParams, deps: PeerGroupDeps) -> Result<Self> {
        Self::with_seeds(config, network, network, deps)
    }

    pub fn with_seeds(
        config: PeerGroupConfig,
        network: &NetworkParams,
        seeds: &dyn SeedSource,
        deps: PeerGroupDeps,
    ) -> Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();

        let block_syncer =
            BlockSyncer::new(deps.store.clone(), network.checkpoint, deps.listener.clone())?;
        let host_manager = PeerHostManager::new(seeds, config.host_retry_backoff());

        Ok(Self {
            transaction_syncer: TransactionSyncer::new(deps.store),
            block_syncer,
            host_manager,
            peer_manager: PeerManager::new(),
            transport: deps.transport,
            bloom_filters: deps.bloom_filters,
            reachability: deps.reachability,
            listener: deps.listener,
            metrics: None,
            started: false,
            config,
            sender,
            receiver,
        })
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn handle(&self) -> PeerGroupHandle {
        PeerGroupHandle {
            sender: self.sender.clone(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn peer_manager(&self) -> &PeerManager {
        &self.peer_manager
    }

    pub fn host_manager(&self) -> &PeerHostManager {
        &self.host_manager
    }

    pub fn block_syncer(&self) -> &BlockSyncer {
        &self.block_syncer
    }

    pub fn transaction_syncer(&self) -> &TransactionSyncer {
        &self.transaction_syncer
    }

    /// Handle one queued event, if any. Returns whether an event was handled.
    pub fn process_next(&mut self) -> bool {
        match self.receiver.try_recv() {
            Ok(event) => {
                self.handle_event(event);
                true
            }
            Err(_) => false,
        }
    }

    /// Drain the queue, including follow-ups enqueued while draining.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while self.process_next() {
            handled += 1;
        }
        handled
    }

    pub async fn run(mut self) {
        let mut reconnect_interval = interval(self.config.reconnect_interval());
        reconnect_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(max_peers = self.config.max_peers, "Peer group running");

        loop {
            select! {
                _ = reconnect_interval.tick() => {
                    self.enqueue(PeerGroupEvent::CheckTimeouts);
                    self.enqueue(PeerGroupEvent::ConnectMissingPeers);
                }
                event = self.receiver.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => break,
                    }
                }
            }
        }
    }

    fn enqueue(&self, event: PeerGroupEvent) {
        if self.sender.send(event).is_err() {
            error!("Peer group queue closed");
        }
    }

    fn handle_event(&mut self, event: PeerGroupEvent) {
        match event {
            PeerGroupEvent::Start => self.on_start(),
            PeerGroupEvent::Stop => self.on_stop(),
            PeerGroupEvent::SendTransaction(transaction) => self.on_send_transaction(transaction),
            PeerGroupEvent::BloomFilterUpdated => self.on_bloom_filter_updated(),
            PeerGroupEvent::SendPendingTransactions => {
                let pending = self.transaction_syncer.pending_transactions();
                self.dispatch_transactions(pending);
            }
            PeerGroupEvent::PeerConnected {
                host,
                announced_last_block_height,
            } => self.on_peer_connected(host, announced_last_block_height),
            PeerGroupEvent::PeerDisconnected { host, error } => {
                self.on_peer_disconnected(host, error)
            }
            PeerGroupEvent::PeerMessage { host, message } => self.on_peer_message(host, message),
            PeerGroupEvent::PeerReady { host } => self.on_peer_ready(host),
            PeerGroupEvent::AssignSyncPeer => self.assign_sync_peer(),
            PeerGroupEvent::ConnectMissingPeers => self.connect_missing_peers(),
            PeerGroupEvent::CheckTimeouts => self.check_timeouts(),
        }
    }

    fn on_start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        info!("Peer group started");
        self.enqueue(PeerGroupEvent::ConnectMissingPeers);
    }

    fn on_stop(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;
        info!(peers = self.peer_manager.hosts().len(), "Peer group stopping");

        for host in self.peer_manager.hosts() {
            if let Some(peer) = self.peer_manager.get_mut(&host) {
                peer.connection_state = ConnectionState::Disconnecting;
            }
            self.release_sync_peer(&host);
            self.transport.disconnect(&host, None);
        }
    }

    fn on_send_transaction(&mut self, transaction: Transaction) {
        match self.transaction_syncer.add_pending(transaction.clone()) {
            Ok(true) => {
                info!(tx = %transaction.hash, "Transaction queued for broadcast");
                self.dispatch_transactions(vec![transaction]);
            }
            Ok(false) => debug!(tx = %transaction.hash, "Transaction already known"),
            Err(err) => error!(tx = %transaction.hash, error = %err, "Failed to store transaction"),
        }
    }

    fn on_bloom_filter_updated(&mut self) {
        let Some(filter) = self.bloom_filters.bloom_filter() else {
            return;
        };
        let hosts: Vec<String> = self
            .peer_manager
            .connected()
            .map(|peer| peer.host().to_string())
            .collect();
        for host in hosts {
            self.transport
                .send(&host, OutboundMessage::FilterLoad(filter.clone()));
        }
    }

    fn dispatch_transactions(&mut self, transactions: Vec<Transaction>) {
        if transactions.is_empty() {
            return;
        }

        let hosts = self.peer_manager.some_ready_peers();
        if hosts.is_empty() {
            debug!(count = transactions.len(), "No ready peers, transactions stay pending");
            return;
        }

        for host in hosts {
            for transaction in &transactions {
                self.add_task(&host, Task::send_transaction(transaction.clone()));
            }
        }
    }

    fn on_peer_connected(&mut self, host: String, announced_last_block_height: u32) {
        let Some(peer) = self.peer_manager.get_mut(&host) else {
            warn!(peer = %host, "Connection from unknown host");
            return;
        };
        if peer.connection_state != ConnectionState::Connecting {
            debug!(peer = %host, state = ?peer.connection_state, "Ignoring late connection");
            return;
        }
        peer.on_connected(announced_last_block_height);

        info!(
            peer = %host,
            height = announced_last_block_height,
            "Peer connected"
        );

        if let Some(metrics) = &self.metrics {
            metrics.inc_peer_connection("success");
            metrics.set_peers(self.peer_manager.connected_count() as i64);
        }

        if let Some(filter) = self.bloom_filters.bloom_filter() {
            self.transport.send(&host, OutboundMessage::FilterLoad(filter));
        }

        self.enqueue(PeerGroupEvent::AssignSyncPeer);
        self.enqueue(PeerGroupEvent::SendPendingTransactions);
    }

    fn on_peer_disconnected(&mut self, host: String, error: Option<PeerGroupError>) {
        let reachable = self.reachability.is_reachable();
        self.host_manager
            .host_disconnected(&host, error.is_some(), reachable, Instant::now());

        match &error {
            Some(err) => warn!(peer = %host, error = %err, "Peer disconnected"),
            None => info!(peer = %host, "Peer disconnected"),
        }

        self.release_sync_peer(&host);

        let removed = self.peer_manager.peer_disconnected(&host).is_some();

        if let Some(metrics) = &self.metrics {
            if removed {
                metrics.inc_peer_disconnection(error.as_ref().map_or("clean", |err| err.reason()));
            }
            metrics.set_peers(self.peer_manager.connected_count() as i64);
        }

        self.enqueue(PeerGroupEvent::AssignSyncPeer);
        self.enqueue(PeerGroupEvent::ConnectMissingPeers);
    }

    fn on_peer_message(&mut self, host: String, message: InboundMessage) {
        let Some(peer) = self.peer_manager.get_mut(&host) else {
            debug!(peer = %host, command = message.command(), "Message from unknown peer");
            return;
        };
        if !peer.is_connected() {
            debug!(peer = %host, command = message.command(), "Message from peer being dropped");
            return;
        }

        let announced_last_block_height = peer.announced_last_block_height;
        let outcome = peer.handle_message(message);

        for message in outcome.outbound {
            self.transport.send(&host, message);
        }

        for merkle_block in outcome.merkle_blocks {
            if !self.on_merkle_block(&host, merkle_block, announced_last_block_height) {
                return;
            }
        }

        if !outcome.transactions.is_empty() {
            if let Err(err) = self.transaction_syncer.handle(outcome.transactions) {
                error!(peer = %host, error = %err, "Failed to store transactions");
            }
        }

        let any_completed = !outcome.completed.is_empty();
        for completion in outcome.completed {
            self.on_task_completed(&host, completion);
        }

        if !outcome.addresses.is_empty() {
            let hosts = outcome
                .addresses
                .into_iter()
                .map(|address| address.address)
                .collect();
            self.host_manager.add_hosts(hosts);
        }

        if !outcome.inventory.is_empty() {
            self.on_inventory(&host, outcome.inventory);
        }

        if any_completed
            && self
                .peer_manager
                .get(&host)
                .is_some_and(|peer| peer.ready())
        {
            self.enqueue(PeerGroupEvent::PeerReady { host });
        }
    }

    /// Returns false when the block got the peer dropped.
    fn on_merkle_block(
        &mut self,
        host: &str,
        merkle_block: MerkleBlock,
        announced_last_block_height: u32,
    ) -> bool {
        let header_hash = merkle_block.header_hash();
        match self
            .block_syncer
            .handle(merkle_block, announced_last_block_height)
        {
            Ok(height) => {
                if let Some(metrics) = &self.metrics {
                    metrics.inc_merkle_blocks("valid");
                    metrics.set_best_block_height(height as i64);
                }
                true
            }
            Err(BlockSyncError::Validation(err)) => {
                warn!(peer = %host, block = %header_hash, error = %err, "Invalid merkle block");
                if let Some(metrics) = &self.metrics {
                    metrics.inc_merkle_blocks("invalid");
                }
                self.disconnect_peer(host, PeerGroupError::Validation(err));
                false
            }
            Err(BlockSyncError::Store(err)) => {
                error!(peer = %host, block = %header_hash, error = %err, "Failed to store merkle block");
                true
            }
        }
    }

    fn on_task_completed(&mut self, host: &str, completion: TaskCompletion) {
        match completion {
            TaskCompletion::BlockHashes(hashes) => {
                let inserted = if hashes.is_empty() {
                    0
                } else {
                    match self.block_syncer.add(hashes) {
                        Ok(inserted) => inserted,
                        Err(err) => {
                            error!(peer = %host, error = %err, "Failed to store block hashes");
                            return;
                        }
                    }
                };

                if inserted == 0 {
                    if let Some(peer) = self.peer_manager.get_mut(host) {
                        peer.block_hashes_synced = true;
                    }
                }
            }
            TaskCompletion::MerkleBlocks => self.block_syncer.download_iteration_completed(),
            TaskCompletion::Transactions(transactions) => {
                if let Err(err) = self.transaction_syncer.handle(transactions) {
                    error!(peer = %host, error = %err, "Failed to store transactions");
                }
            }
            TaskCompletion::TransactionSent(transaction) => {
                if let Err(err) = self.transaction_syncer.handle_sent(&transaction) {
                    error!(peer = %host, tx = %transaction.hash, error = %err, "Failed to mark transaction sent");
                }
            }
        }
    }

    fn on_inventory(&mut self, host: &str, items: Vec<InventoryItem>) {
        let mut new_block = false;
        let mut transaction_hashes: Vec<Bytes32> = Vec::new();

        for item in items {
            if item.is_block() {
                if self.block_syncer.should_request_block(&item.hash) {
                    new_block = true;
                }
            } else if item.is_transaction()
                && self.transaction_syncer.should_request_transaction(&item.hash)
                && !transaction_hashes.contains(&item.hash)
                && !self
                    .peer_manager
                    .connected()
                    .any(|peer| peer.is_requesting_inventory(&item.hash))
            {
                transaction_hashes.push(item.hash);
            }
        }

        if new_block {
            if let Some(peer) = self.peer_manager.get_mut(host) {
                peer.synced = false;
                peer.block_hashes_synced = false;
            }
            debug!(peer = %host, "New block announced");
            self.enqueue(PeerGroupEvent::AssignSyncPeer);
        }

        if !transaction_hashes.is_empty() {
            self.add_task(host, Task::request_transactions(transaction_hashes));
        }
    }

    fn on_peer_ready(&mut self, host: String) {
        if !self.peer_manager.sync_peer_is(&host) {
            return;
        }
        let Some(peer) = self.peer_manager.get(&host) else {
            return;
        };
        if !peer.ready() {
            return;
        }

        let announced = peer.announced_last_block_height;
        let block_hashes_synced = peer.block_hashes_synced;
        let pending = self.block_syncer.get_block_hashes();
        let local_best = self.block_syncer.local_known_best_block_height();
        let difference = announced as i64 - local_best as i64;
        let floor = difference.max(0) as usize;

        debug!(
            peer = %host,
            announced,
            local_best,
            pending = pending.len(),
            block_hashes_synced,
            "Sync peer ready"
        );

        if !block_hashes_synced {
            let locator = self.block_syncer.get_block_locator_hashes(announced);
            if !pending.is_empty() {
                let expected_min = if difference == 0 {
                    EXPECTED_HASHES_MIN_AT_TIP
                } else {
                    floor
                };
                self.add_task(&host, Task::get_merkle_blocks(pending));
                self.add_task(&host, Task::get_block_hashes(locator, expected_min));
            } else {
                if let Some(peer) = self.peer_manager.get_mut(&host) {
                    peer.synced = false;
                }
                self.add_task(&host, Task::get_block_hashes(locator, floor));
            }
        } else if !pending.is_empty() {
            self.add_task(&host, Task::get_merkle_blocks(pending));
        } else {
            if let Some(peer) = self.peer_manager.get_mut(&host) {
                peer.synced = true;
            }
            self.block_syncer.download_completed();
            self.listener.sync_finished();
            self.transport.send(&host, OutboundMessage::MemPool);
            self.peer_manager.set_sync_peer(None);
            if let Some(metrics) = &self.metrics {
                metrics.inc_sync_rounds("completed");
            }
            info!(peer = %host, height = local_best, "Sync peer has no more blocks");
            self.enqueue(PeerGroupEvent::AssignSyncPeer);
        }
    }

    fn assign_sync_peer(&mut self) {
        if self.peer_manager.sync_peer().is_some() {
            return;
        }
        let Some(host) = self.peer_manager.non_synced_peer() else {
            return;
        };

        info!(peer = %host, "Sync peer elected");
        self.peer_manager.set_sync_peer(Some(host.clone()));
        self.block_syncer.download_started();
        self.enqueue(PeerGroupEvent::PeerReady { host });
    }

    fn connect_missing_peers(&mut self) {
        while self.started && self.peer_manager.total_peers_count() < self.config.max_peers {
            let Some(host) = self.host_manager.peer_host(Instant::now()) else {
                debug!(
                    peers = self.peer_manager.total_peers_count(),
                    "No host available to dial"
                );
                break;
            };

            debug!(peer = %host, "Dialing");
            self.peer_manager
                .add(Peer::new(host.clone(), self.config.task_timeout()));
            self.transport.connect(&host);
        }
    }

    fn check_timeouts(&mut self) {
        let now = Instant::now();
        for host in self.peer_manager.hosts() {
            let Some(peer) = self.peer_manager.get_mut(&host) else {
                continue;
            };
            if !peer.is_connected() {
                continue;
            }

            let check = peer.check_timeouts(now);
            if check.expired {
                warn!(peer = %host, "Task timed out");
                self.disconnect_peer(&host, PeerGroupError::Transport(TransportError::Timeout));
            } else if check.dropped > 0 {
                debug!(peer = %host, dropped = check.dropped, "Transaction announcements expired");
                if peer.ready() {
                    self.enqueue(PeerGroupEvent::PeerReady { host });
                }
            }
        }
    }

    fn add_task(&mut self, host: &str, task: Task) {
        let Some(peer) = self.peer_manager.get_mut(host) else {
            return;
        };
        for message in peer.add_task(task, Instant::now()) {
            self.transport.send(host, message);
        }
    }

    fn disconnect_peer(&mut self, host: &str, error: PeerGroupError) {
        if let Some(peer) = self.peer_manager.get_mut(host) {
            peer.connection_state = ConnectionState::Disconnecting;
        }
        self.release_sync_peer(host);
        self.transport.disconnect(host, Some(error));
    }

    /// Abandons the round of a sync peer that is going away and lets another
    /// connected peer take over without waiting for the transport.
    fn release_sync_peer(&mut self, host: &str) {
        if !self.peer_manager.sync_peer_is(host) {
            return;
        }
        self.block_syncer.download_failed();
        self.peer_manager.set_sync_peer(None);
        if let Some(metrics) = &self.metrics {
            metrics.inc_sync_rounds("failed");
        }
        self.enqueue(PeerGroupEvent::AssignSyncPeer);
    }
}
