//! Outstanding requests bound to one peer.
//!
//! A task sends its request when started, consumes the responses it is
//! waiting for and reports completion exactly once, when the peer turns it
//! into a [`TaskCompletion`]. Requests that a peer may silently ignore are
//! followed by a `ping`; the matching `pong` closes them.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use containers::{BlockHash, Bytes32, InventoryItem, MerkleBlock, Transaction};

use crate::sync::config::MAX_BLOCK_HASHES_PER_RESPONSE;
use crate::sync::merkle_validator::MerkleValidator;
use crate::types::OutboundMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    GetBlockHashes,
    GetMerkleBlocks,
    RequestTransactions,
    SendTransaction,
}

/// Result of a finished task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskCompletion {
    BlockHashes(Vec<Bytes32>),
    MerkleBlocks,
    Transactions(Vec<Transaction>),
    TransactionSent(Transaction),
}

#[derive(Debug, Clone)]
pub enum Task {
    GetBlockHashes(GetBlockHashesTask),
    GetMerkleBlocks(GetMerkleBlocksTask),
    RequestTransactions(RequestTransactionsTask),
    SendTransaction(SendTransactionTask),
}

impl Task {
    pub fn get_block_hashes(locator: Vec<Bytes32>, expected_min: usize) -> Self {
        Task::GetBlockHashes(GetBlockHashesTask::new(locator, expected_min))
    }

    pub fn get_merkle_blocks(block_hashes: Vec<BlockHash>) -> Self {
        Task::GetMerkleBlocks(GetMerkleBlocksTask::new(block_hashes))
    }

    pub fn request_transactions(hashes: Vec<Bytes32>) -> Self {
        Task::RequestTransactions(RequestTransactionsTask::new(hashes))
    }

    pub fn send_transaction(transaction: Transaction) -> Self {
        Task::SendTransaction(SendTransactionTask::new(transaction))
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            Task::GetBlockHashes(_) => TaskKind::GetBlockHashes,
            Task::GetMerkleBlocks(_) => TaskKind::GetMerkleBlocks,
            Task::RequestTransactions(_) => TaskKind::RequestTransactions,
            Task::SendTransaction(_) => TaskKind::SendTransaction,
        }
    }

    /// Arm the deadline and return the messages that open the exchange.
    pub fn start(&mut self, now: Instant, timeout: Duration) -> Vec<OutboundMessage> {
        let deadline = Some(now + timeout);
        match self {
            Task::GetBlockHashes(task) => {
                task.deadline = deadline;
                vec![
                    OutboundMessage::GetBlocks {
                        locator: task.locator.clone(),
                    },
                    OutboundMessage::Ping(task.nonce),
                ]
            }
            Task::GetMerkleBlocks(task) => {
                task.deadline = deadline;
                let items = task
                    .requested
                    .iter()
                    .map(|block_hash| InventoryItem::filtered_block(block_hash.header_hash))
                    .collect();
                vec![OutboundMessage::GetData(items), OutboundMessage::Ping(task.nonce)]
            }
            Task::RequestTransactions(task) => {
                task.deadline = deadline;
                let items = task
                    .hashes
                    .iter()
                    .map(|hash| InventoryItem::transaction(*hash))
                    .collect();
                vec![OutboundMessage::GetData(items), OutboundMessage::Ping(task.nonce)]
            }
            Task::SendTransaction(task) => {
                task.deadline = deadline;
                vec![OutboundMessage::Inventory(vec![InventoryItem::transaction(
                    task.transaction.hash,
                )])]
            }
        }
    }

    /// Take the inventory items this task was waiting for; the rest is
    /// returned.
    pub fn handle_inventory(&mut self, items: Vec<InventoryItem>) -> Vec<InventoryItem> {
        match self {
            Task::GetBlockHashes(task) => task.handle_inventory(items),
            _ => items,
        }
    }

    /// Returns the block back when this task did not request it. Blocks
    /// ready for processing are appended to `ready` in request order.
    pub fn handle_merkle_block(
        &mut self,
        merkle_block: MerkleBlock,
        ready: &mut Vec<MerkleBlock>,
    ) -> Option<MerkleBlock> {
        match self {
            Task::GetMerkleBlocks(task) => task.handle_merkle_block(merkle_block, ready),
            _ => Some(merkle_block),
        }
    }

    pub fn handle_transaction(
        &mut self,
        transaction: Transaction,
        ready: &mut Vec<MerkleBlock>,
    ) -> Option<Transaction> {
        match self {
            Task::GetMerkleBlocks(task) => task.handle_transaction(transaction, ready),
            Task::RequestTransactions(task) => task.handle_transaction(transaction),
            _ => Some(transaction),
        }
    }

    pub fn handle_get_data(
        &mut self,
        items: Vec<InventoryItem>,
        outbound: &mut Vec<OutboundMessage>,
    ) -> Vec<InventoryItem> {
        match self {
            Task::SendTransaction(task) => task.handle_get_data(items, outbound),
            _ => items,
        }
    }

    /// Returns whether the pong answered this task's ping.
    pub fn handle_pong(&mut self, nonce: u64, ready: &mut Vec<MerkleBlock>) -> bool {
        match self {
            Task::GetBlockHashes(task) => task.handle_pong(nonce),
            Task::GetMerkleBlocks(task) => task.handle_pong(nonce, ready),
            Task::RequestTransactions(task) => task.handle_pong(nonce),
            Task::SendTransaction(_) => false,
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            Task::GetBlockHashes(task) => task.result.is_some(),
            Task::GetMerkleBlocks(task) => task.finished,
            Task::RequestTransactions(task) => task.finished,
            Task::SendTransaction(task) => task.finished,
        }
    }

    pub fn is_timed_out(&self, now: Instant) -> bool {
        let deadline = match self {
            Task::GetBlockHashes(task) => task.deadline,
            Task::GetMerkleBlocks(task) => task.deadline,
            Task::RequestTransactions(task) => task.deadline,
            Task::SendTransaction(task) => task.deadline,
        };
        deadline.is_some_and(|deadline| now >= deadline)
    }

    pub fn is_requesting_inventory(&self, hash: &Bytes32) -> bool {
        match self {
            Task::GetBlockHashes(_) => false,
            Task::GetMerkleBlocks(task) => task.is_requesting(hash),
            Task::RequestTransactions(task) => task.is_requesting(hash),
            Task::SendTransaction(_) => false,
        }
    }

    pub fn ping_nonce(&self) -> Option<u64> {
        match self {
            Task::GetBlockHashes(task) => Some(task.nonce),
            Task::GetMerkleBlocks(task) => Some(task.nonce),
            Task::RequestTransactions(task) => Some(task.nonce),
            Task::SendTransaction(_) => None,
        }
    }

    pub fn into_completion(self) -> TaskCompletion {
        match self {
            Task::GetBlockHashes(task) => {
                TaskCompletion::BlockHashes(task.result.unwrap_or_default())
            }
            Task::GetMerkleBlocks(_) => TaskCompletion::MerkleBlocks,
            Task::RequestTransactions(task) => TaskCompletion::Transactions(task.received),
            Task::SendTransaction(task) => TaskCompletion::TransactionSent(task.transaction),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GetBlockHashesTask {
    locator: Vec<Bytes32>,
    expected_min: usize,
    nonce: u64,
    best_batch: Vec<Bytes32>,
    result: Option<Vec<Bytes32>>,
    deadline: Option<Instant>,
}

impl GetBlockHashesTask {
    pub fn new(locator: Vec<Bytes32>, expected_min: usize) -> Self {
        Self {
            locator,
            expected_min: expected_min.min(MAX_BLOCK_HASHES_PER_RESPONSE),
            nonce: rand::random(),
            best_batch: Vec::new(),
            result: None,
            deadline: None,
        }
    }

    pub fn expected_min(&self) -> usize {
        self.expected_min
    }

    fn handle_inventory(&mut self, items: Vec<InventoryItem>) -> Vec<InventoryItem> {
        if self.result.is_some() {
            return items;
        }

        let mut hashes: Vec<Bytes32> = Vec::new();
        for item in items.iter().filter(|item| item.is_block()) {
            if !self.locator.contains(&item.hash) && !hashes.contains(&item.hash) {
                hashes.push(item.hash);
            }
        }

        if hashes.is_empty() {
            return items;
        }

        if hashes.len() >= self.expected_min {
            hashes.truncate(MAX_BLOCK_HASHES_PER_RESPONSE);
            self.result = Some(hashes);
        } else if hashes.len() > self.best_batch.len() {
            self.best_batch = hashes;
        }

        items.into_iter().filter(|item| !item.is_block()).collect()
    }

    fn handle_pong(&mut self, nonce: u64) -> bool {
        if nonce != self.nonce || self.result.is_some() {
            return false;
        }
        self.result = Some(std::mem::take(&mut self.best_batch));
        true
    }
}

#[derive(Debug, Clone)]
pub struct GetMerkleBlocksTask {
    requested: Vec<BlockHash>,
    received: VecDeque<MerkleBlock>,
    validator: MerkleValidator,
    nonce: u64,
    finished: bool,
    deadline: Option<Instant>,
}

impl GetMerkleBlocksTask {
    pub fn new(block_hashes: Vec<BlockHash>) -> Self {
        Self {
            requested: block_hashes,
            received: VecDeque::new(),
            validator: MerkleValidator::default(),
            nonce: rand::random(),
            finished: false,
            deadline: None,
        }
    }

    fn handle_merkle_block(
        &mut self,
        mut merkle_block: MerkleBlock,
        ready: &mut Vec<MerkleBlock>,
    ) -> Option<MerkleBlock> {
        let header_hash = merkle_block.header_hash();
        let Some(position) = self
            .requested
            .iter()
            .position(|block_hash| block_hash.header_hash == header_hash)
        else {
            return Some(merkle_block);
        };

        let block_hash = self.requested.remove(position);
        merkle_block.height = block_hash.height;
        // An invalid proof is passed on untouched for the block syncer to reject.
        merkle_block.transaction_hashes = self.validator.validate(&merkle_block).unwrap_or_default();
        merkle_block.transactions.clear();

        self.received.push_back(merkle_block);
        self.release_ready(ready);
        None
    }

    fn handle_transaction(
        &mut self,
        transaction: Transaction,
        ready: &mut Vec<MerkleBlock>,
    ) -> Option<Transaction> {
        let Some(merkle_block) = self.received.iter_mut().find(|merkle_block| {
            merkle_block.is_matching(&transaction.hash)
                && !merkle_block
                    .transactions
                    .iter()
                    .any(|tx| tx.hash == transaction.hash)
        }) else {
            return Some(transaction);
        };

        merkle_block.transactions.push(transaction);
        self.release_ready(ready);
        None
    }

    fn handle_pong(&mut self, nonce: u64, ready: &mut Vec<MerkleBlock>) -> bool {
        if nonce != self.nonce || self.finished {
            return false;
        }
        ready.extend(self.received.drain(..));
        self.finished = true;
        true
    }

    // Blocks leave strictly in arrival order so a child never overtakes its
    // parent.
    fn release_ready(&mut self, ready: &mut Vec<MerkleBlock>) {
        while self
            .received
            .front()
            .is_some_and(|merkle_block| merkle_block.is_complete())
        {
            if let Some(merkle_block) = self.received.pop_front() {
                ready.push(merkle_block);
            }
        }

        if self.requested.is_empty() && self.received.is_empty() {
            self.finished = true;
        }
    }

    fn is_requesting(&self, hash: &Bytes32) -> bool {
        self.requested
            .iter()
            .any(|block_hash| block_hash.header_hash == *hash)
            || self
                .received
                .iter()
                .any(|merkle_block| merkle_block.is_matching(hash))
    }
}

#[derive(Debug, Clone)]
pub struct RequestTransactionsTask {
    hashes: Vec<Bytes32>,
    received: Vec<Transaction>,
    nonce: u64,
    finished: bool,
    deadline: Option<Instant>,
}

impl RequestTransactionsTask {
    pub fn new(hashes: Vec<Bytes32>) -> Self {
        Self {
            hashes,
            received: Vec::new(),
            nonce: rand::random(),
            finished: false,
            deadline: None,
        }
    }

    fn handle_transaction(&mut self, transaction: Transaction) -> Option<Transaction> {
        if !self.is_requesting(&transaction.hash) {
            return Some(transaction);
        }

        self.received.push(transaction);
        if self.received.len() == self.hashes.len() {
            self.finished = true;
        }
        None
    }

    fn handle_pong(&mut self, nonce: u64) -> bool {
        if nonce != self.nonce || self.finished {
            return false;
        }
        self.finished = true;
        true
    }

    fn is_requesting(&self, hash: &Bytes32) -> bool {
        self.hashes.contains(hash) && !self.received.iter().any(|tx| tx.hash == *hash)
    }
}

#[derive(Debug, Clone)]
pub struct SendTransactionTask {
    transaction: Transaction,
    finished: bool,
    deadline: Option<Instant>,
}

impl SendTransactionTask {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            finished: false,
            deadline: None,
        }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    fn handle_get_data(
        &mut self,
        items: Vec<InventoryItem>,
        outbound: &mut Vec<OutboundMessage>,
    ) -> Vec<InventoryItem> {
        if self.finished {
            return items;
        }

        let (ours, rest): (Vec<InventoryItem>, Vec<InventoryItem>) = items
            .into_iter()
            .partition(|item| item.is_transaction() && item.hash == self.transaction.hash);

        if !ours.is_empty() {
            outbound.push(OutboundMessage::Transaction(self.transaction.clone()));
            self.finished = true;
        }
        rest
    }
}
