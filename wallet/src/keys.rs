use containers::{Address, PublicKey};

use crate::error::KeyDerivationError;

/// Key derivation for the wallet's account hierarchy.
pub trait HdWallet: Send + Sync {
    /// Consecutive unused keys after which discovery stops in one direction.
    fn gap_limit(&self) -> u32;

    fn public_key(
        &self,
        account: u32,
        index: u32,
        external: bool,
    ) -> Result<PublicKey, KeyDerivationError>;
}

/// Every address encoding a key may have been paid to.
pub trait AddressSelector: Send + Sync {
    fn address_variants(&self, public_key: &PublicKey) -> Vec<Address>;
}

/// Tracks the keys the wallet watches.
pub trait AddressManager: Send + Sync {
    fn add_keys(&self, keys: Vec<PublicKey>) -> anyhow::Result<()>;

    /// Derive fresh keys so every chain keeps its gap of unused keys.
    fn fill_gap(&self) -> anyhow::Result<()>;
}
