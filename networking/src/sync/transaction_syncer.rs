use std::sync::Arc;

use anyhow::Result;
use chain::ChainStore;
use containers::{Bytes32, Transaction, TransactionRecord, TransactionStatus};
use tracing::debug;

/// Tracks the broadcast state of wallet transactions.
pub struct TransactionSyncer {
    store: Arc<dyn ChainStore>,
}

impl TransactionSyncer {
    pub fn new(store: Arc<dyn ChainStore>) -> Self {
        Self { store }
    }

    /// Locally created transactions no peer has asked for yet.
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.store
            .transactions_with_status(TransactionStatus::New)
            .into_iter()
            .map(|record| record.transaction)
            .collect()
    }

    pub fn should_request_transaction(&self, hash: &Bytes32) -> bool {
        self.store.transaction(hash).is_none()
    }

    /// Store transactions relayed by the network. A pending transaction
    /// coming back means the network accepted it.
    pub fn handle(&self, transactions: Vec<Transaction>) -> Result<()> {
        for transaction in transactions {
            let block_hash = self
                .store
                .transaction(&transaction.hash)
                .and_then(|record| record.block_hash);

            debug!(tx = %transaction.hash, "Transaction relayed");
            let mut record = TransactionRecord::new(transaction, TransactionStatus::Relayed);
            record.block_hash = block_hash;
            self.store.save_transaction(record)?;
        }
        Ok(())
    }

    pub fn handle_sent(&self, transaction: &Transaction) -> Result<()> {
        let Some(mut record) = self.store.transaction(&transaction.hash) else {
            return Ok(());
        };

        if record.status == TransactionStatus::New {
            record.status = TransactionStatus::Sent;
            self.store.save_transaction(record)?;
            debug!(tx = %transaction.hash, "Transaction sent");
        }
        Ok(())
    }

    /// Queue a locally created transaction for broadcast. Known transactions
    /// are left untouched.
    pub fn add_pending(&self, transaction: Transaction) -> Result<bool> {
        if self.store.transaction(&transaction.hash).is_some() {
            return Ok(false);
        }
        self.store
            .save_transaction(TransactionRecord::new(transaction, TransactionStatus::New))?;
        Ok(true)
    }
}
