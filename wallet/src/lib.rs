// Wallet side of the sync core: address discovery and block hash bootstrap
pub mod api;
pub mod error;
pub mod initial_syncer;
pub mod keys;

pub use api::{BlockResponse, InitialSyncApi};
pub use error::{ApiError, InitialSyncError, KeyDerivationError};
pub use initial_syncer::{InitialSyncer, InitialSyncerDeps};
pub use keys::{AddressManager, AddressSelector, HdWallet};
