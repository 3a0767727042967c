use crate::Bytes32;
use serde::{Deserialize, Serialize};

/// Object type of an inventory vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum InventoryKind {
    Error = 0,
    Transaction = 1,
    Block = 2,
    FilteredBlock = 3,
}

impl InventoryKind {
    /// Convert from the wire code to an InventoryKind.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(InventoryKind::Error),
            1 => Some(InventoryKind::Transaction),
            2 => Some(InventoryKind::Block),
            3 => Some(InventoryKind::FilteredBlock),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        *self as u32
    }
}

/// A peer's announcement (or our request) of a block or transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryItem {
    pub kind: InventoryKind,
    pub hash: Bytes32,
}

impl InventoryItem {
    pub fn new(kind: InventoryKind, hash: Bytes32) -> Self {
        Self { kind, hash }
    }

    pub fn block(hash: Bytes32) -> Self {
        Self::new(InventoryKind::Block, hash)
    }

    pub fn filtered_block(hash: Bytes32) -> Self {
        Self::new(InventoryKind::FilteredBlock, hash)
    }

    pub fn transaction(hash: Bytes32) -> Self {
        Self::new(InventoryKind::Transaction, hash)
    }

    pub fn is_block(&self) -> bool {
        matches!(self.kind, InventoryKind::Block | InventoryKind::FilteredBlock)
    }

    pub fn is_transaction(&self) -> bool {
        self.kind == InventoryKind::Transaction
    }
}

/// An entry of an `addr` message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkAddress {
    pub services: u64,
    pub address: String,
    pub port: u16,
}

impl NetworkAddress {
    pub fn new(services: u64, address: impl Into<String>, port: u16) -> Self {
        Self {
            services,
            address: address.into(),
            port,
        }
    }
}
