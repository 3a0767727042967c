pub mod block;
pub mod bloom;
pub mod checkpoint;
pub mod inventory;
pub mod keys;
pub mod transaction;
pub mod types;

pub use block::{Block, BlockHash, BlockHeader, MerkleBlock};
pub use bloom::BloomFilter;
pub use checkpoint::Checkpoint;
pub use inventory::{InventoryItem, InventoryKind, NetworkAddress};
pub use keys::{Address, PublicKey};
pub use transaction::{Transaction, TransactionRecord, TransactionStatus};
pub use types::{double_sha256, Bytes32};
