use crate::{double_sha256, Bytes32};
use serde::{Deserialize, Serialize};

/// A serialized transaction and its txid.
///
/// The sync core does not interpret transaction contents; parsing and wallet
/// relevance belong to the transaction processor outside of it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: Bytes32,
    pub raw: Vec<u8>,
}

impl Transaction {
    pub fn new(raw: Vec<u8>) -> Self {
        Self {
            hash: double_sha256(&raw),
            raw,
        }
    }
}

/// Broadcast state of a stored transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Created locally, not yet handed to any peer.
    New,
    /// Served to a peer that asked for it.
    Sent,
    /// Seen coming back from the network or included in a block.
    Relayed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub transaction: Transaction,
    pub status: TransactionStatus,
    pub block_hash: Option<Bytes32>,
}

impl TransactionRecord {
    pub fn new(transaction: Transaction, status: TransactionStatus) -> Self {
        Self {
            transaction,
            status,
            block_hash: None,
        }
    }

    pub fn hash(&self) -> Bytes32 {
        self.transaction.hash
    }
}
