pub mod task;

use std::time::{Duration, Instant};

use containers::{Bytes32, InventoryItem, MerkleBlock, NetworkAddress, Transaction};
use tracing::{debug, trace};

use crate::types::{ConnectionState, InboundMessage, OutboundMessage};
pub use task::{Task, TaskCompletion, TaskKind};

/// Everything a single inbound message produced, for the group to act on.
#[derive(Debug, Default)]
pub struct PeerOutcome {
    pub outbound: Vec<OutboundMessage>,
    pub completed: Vec<TaskCompletion>,
    pub merkle_blocks: Vec<MerkleBlock>,
    /// Transactions no task asked for.
    pub transactions: Vec<Transaction>,
    /// Inventory no task consumed.
    pub inventory: Vec<InventoryItem>,
    pub addresses: Vec<NetworkAddress>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TimeoutCheck {
    /// A request the sync depends on expired; the peer must be dropped.
    pub expired: bool,
    /// Timed out `SendTransaction` tasks that were discarded.
    pub dropped: usize,
}

/// One live connection as seen by the peer group.
///
/// The peer owns its outstanding tasks and routes inbound messages to them.
/// It performs no I/O: messages to send come back to the caller.
#[derive(Debug, Clone)]
pub struct Peer {
    host: String,
    pub connection_state: ConnectionState,
    /// The peer has nothing left to give us.
    pub synced: bool,
    /// The peer's `getblocks` answers stopped producing new hashes.
    pub block_hashes_synced: bool,
    pub announced_last_block_height: u32,
    task_timeout: Duration,
    tasks: Vec<Task>,
}

impl Peer {
    pub fn new(host: impl Into<String>, task_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            connection_state: ConnectionState::Connecting,
            synced: false,
            block_hashes_synced: false,
            announced_last_block_height: 0,
            task_timeout,
            tasks: Vec::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    /// Connected and not waiting on any request.
    pub fn ready(&self) -> bool {
        self.is_connected() && self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn on_connected(&mut self, announced_last_block_height: u32) {
        self.connection_state = ConnectionState::Connected;
        self.announced_last_block_height = announced_last_block_height;
    }

    /// Queue a task and return the messages that start it.
    pub fn add_task(&mut self, mut task: Task, now: Instant) -> Vec<OutboundMessage> {
        let messages = task.start(now, self.task_timeout);
        debug!(peer = %self.host, task = ?task.kind(), "Task added");
        self.tasks.push(task);
        messages
    }

    pub fn is_requesting_inventory(&self, hash: &Bytes32) -> bool {
        self.tasks
            .iter()
            .any(|task| task.is_requesting_inventory(hash))
    }

    pub fn handle_message(&mut self, message: InboundMessage) -> PeerOutcome {
        let mut outcome = PeerOutcome::default();
        trace!(peer = %self.host, command = message.command(), "Message received");

        match message {
            InboundMessage::Inventory(items) => {
                let mut remaining = items;
                for task in &mut self.tasks {
                    if remaining.is_empty() {
                        break;
                    }
                    remaining = task.handle_inventory(remaining);
                }
                outcome.inventory = remaining;
            }
            InboundMessage::MerkleBlock(merkle_block) => {
                let mut unsolicited = Some(merkle_block);
                for task in &mut self.tasks {
                    let Some(merkle_block) = unsolicited.take() else {
                        break;
                    };
                    unsolicited = task.handle_merkle_block(merkle_block, &mut outcome.merkle_blocks);
                }
                if let Some(merkle_block) = unsolicited {
                    debug!(
                        peer = %self.host,
                        block = %merkle_block.header_hash(),
                        "Ignoring unrequested merkle block"
                    );
                }
            }
            InboundMessage::Transaction(transaction) => {
                let mut unsolicited = Some(transaction);
                for task in &mut self.tasks {
                    let Some(transaction) = unsolicited.take() else {
                        break;
                    };
                    unsolicited = task.handle_transaction(transaction, &mut outcome.merkle_blocks);
                }
                outcome.transactions.extend(unsolicited);
            }
            InboundMessage::GetData(items) => {
                let mut remaining = items;
                for task in &mut self.tasks {
                    if remaining.is_empty() {
                        break;
                    }
                    remaining = task.handle_get_data(remaining, &mut outcome.outbound);
                }
                if !remaining.is_empty() {
                    debug!(peer = %self.host, items = remaining.len(), "Unanswered getdata");
                }
            }
            InboundMessage::Addresses(addresses) => {
                outcome.addresses = addresses;
            }
            InboundMessage::Pong(nonce) => {
                for task in &mut self.tasks {
                    if task.handle_pong(nonce, &mut outcome.merkle_blocks) {
                        break;
                    }
                }
            }
        }

        outcome.completed = self.take_finished();
        outcome
    }

    /// Drop expired tasks. Anything other than a transaction announcement
    /// expiring means the peer stalled.
    pub fn check_timeouts(&mut self, now: Instant) -> TimeoutCheck {
        let mut check = TimeoutCheck::default();

        self.tasks.retain(|task| {
            if !task.is_timed_out(now) {
                return true;
            }
            match task.kind() {
                TaskKind::SendTransaction => check.dropped += 1,
                _ => check.expired = true,
            }
            false
        });

        check
    }

    fn take_finished(&mut self) -> Vec<TaskCompletion> {
        let mut completed = Vec::new();
        let mut index = 0;
        while index < self.tasks.len() {
            if self.tasks[index].is_finished() {
                let task = self.tasks.remove(index);
                debug!(peer = %self.host, task = ?task.kind(), "Task completed");
                completed.push(task.into_completion());
            } else {
                index += 1;
            }
        }
        completed
    }
}
