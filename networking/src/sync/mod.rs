/// Synchronization core of the SPV client.
///
/// - **Block Syncer**: Local chain view, block-hash frontier and merkle block intake
/// - **Merkle Validator**: BIP 37 partial merkle tree checks
/// - **Transaction Syncer**: Broadcast state of wallet transactions
/// - **Peer Manager**: Peer set and sync peer election
/// - **Peer Host Manager**: Host candidates, scoring and retry backoff
/// - **Peer Group**: Serialized event loop tying everything together
///
/// ## Sync round
///
/// 1. A connected, not yet synced peer is elected sync peer
/// 2. It is asked for block hashes beyond our best known block
/// 3. Known but undownloaded hashes are fetched as merkle blocks
/// 4. Once it returns nothing new, the round ends and `mempool` is requested
/// 5. A new block announcement from any peer starts another round
///
/// ## State Machine
///
/// - **IDLE**: No sync peer
/// - **SYNCING**: Sync peer downloading
/// - **SYNCED**: Last round completed
pub mod block_syncer;
pub mod config;
pub mod merkle_validator;
pub mod peer_group;
pub mod peer_host_manager;
pub mod peer_manager;
pub mod states;
pub mod transaction_syncer;

pub use block_syncer::{BlockSyncError, BlockSyncer};
pub use config::*;
pub use merkle_validator::MerkleValidator;
pub use peer_group::{PeerGroup, PeerGroupDeps, PeerGroupEvent, PeerGroupHandle};
pub use peer_host_manager::PeerHostManager;
pub use peer_manager::PeerManager;
pub use states::SyncState;
pub use transaction_syncer::TransactionSyncer;

#[cfg(test)]
mod tests;
