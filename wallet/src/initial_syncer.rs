//! Initial sync: gap-limit address discovery against the remote history index.
//!
//! A run walks accounts from 0, scanning the external and internal chains of
//! each account concurrently. Every key's address variants are queried at
//! once and the run fails on the first error, dropping the queries still in
//! flight. Nothing is written until the whole run has succeeded.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chain::{ChainStore, NetworkParams};
use containers::{BlockHash, Bytes32, PublicKey};
use futures::future::try_join_all;
use futures::try_join;
use networking::{PeerGroupControl, SyncStateListener};
use tracing::{debug, info, warn};

use crate::api::{BlockResponse, InitialSyncApi};
use crate::error::InitialSyncError;
use crate::keys::{AddressManager, AddressSelector, HdWallet};

/// Collaborators of the initial syncer.
pub struct InitialSyncerDeps {
    pub store: Arc<dyn ChainStore>,
    pub listener: Arc<dyn SyncStateListener>,
    pub hd_wallet: Arc<dyn HdWallet>,
    pub api: Arc<dyn InitialSyncApi>,
    pub address_manager: Arc<dyn AddressManager>,
    pub address_selector: Arc<dyn AddressSelector>,
    pub peer_group: Arc<dyn PeerGroupControl>,
}

pub struct InitialSyncer {
    store: Arc<dyn ChainStore>,
    listener: Arc<dyn SyncStateListener>,
    hd_wallet: Arc<dyn HdWallet>,
    api: Arc<dyn InitialSyncApi>,
    address_manager: Arc<dyn AddressManager>,
    address_selector: Arc<dyn AddressSelector>,
    peer_group: Arc<dyn PeerGroupControl>,
    network: NetworkParams,
    syncing: AtomicBool,
}

/// Keys and activity found on one chain of one account.
#[derive(Debug, Default)]
struct ChainDiscovery {
    keys: Vec<PublicKey>,
    block_hashes: Vec<BlockHash>,
    active: bool,
}

/// Result of a run that has not been committed yet.
#[derive(Debug, Default)]
struct Discovery {
    /// One batch per account: external keys, then internal keys.
    key_batches: Vec<Vec<PublicKey>>,
    block_hashes: Vec<BlockHash>,
}

/// Clears the in-progress flag however the run ends, including the `sync`
/// future being dropped.
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl InitialSyncer {
    pub fn new(network: NetworkParams, deps: InitialSyncerDeps) -> Self {
        Self {
            store: deps.store,
            listener: deps.listener,
            hd_wallet: deps.hd_wallet,
            api: deps.api,
            address_manager: deps.address_manager,
            address_selector: deps.address_selector,
            peer_group: deps.peer_group,
            network,
            syncing: AtomicBool::new(false),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Discover the wallet's addresses and bootstrap block hashes, then start
    /// the peer group.
    ///
    /// Returns immediately while another run is in progress. Once the wallet
    /// is restored only the peer group is started. A failed run commits
    /// nothing and the next call starts over from account 0.
    pub async fn sync(&self) -> Result<(), InitialSyncError> {
        if !self.network.syncable_from_api && !self.store.restored() {
            info!(network = ?self.network.kind, "Network not syncable from API, skipping discovery");
            self.store.set_restored(true)?;
        }

        if self.store.restored() {
            self.peer_group.start();
            return Ok(());
        }

        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            debug!("Initial sync already running");
            return Ok(());
        };

        info!("Initial sync started");
        self.listener.sync_started();

        let result = match self.discover().await {
            Ok(discovery) => self.commit(discovery),
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            warn!(error = %err, "Initial sync stopped");
            self.listener.sync_stopped();
        }

        result
    }

    async fn discover(&self) -> Result<Discovery, InitialSyncError> {
        let gap_limit = self.hd_wallet.gap_limit();
        if gap_limit == 0 {
            return Err(InitialSyncError::InvalidGapLimit);
        }

        let mut discovery = Discovery::default();
        let mut seen: HashSet<Bytes32> = HashSet::new();
        let mut account = 0;

        loop {
            let (external, internal) = try_join!(
                self.discover_chain(account, true, gap_limit),
                self.discover_chain(account, false, gap_limit)
            )?;

            let active = external.active || internal.active;
            debug!(
                account,
                external_keys = external.keys.len(),
                internal_keys = internal.keys.len(),
                active,
                "Account scanned"
            );

            let mut keys = external.keys;
            keys.extend(internal.keys);
            discovery.key_batches.push(keys);

            for block_hash in external
                .block_hashes
                .into_iter()
                .chain(internal.block_hashes)
            {
                if seen.insert(block_hash.header_hash) {
                    discovery.block_hashes.push(block_hash);
                }
            }

            if !active {
                break;
            }
            account += 1;
        }

        Ok(discovery)
    }

    /// Scan one chain until `gap_limit` consecutive derived keys are unused.
    async fn discover_chain(
        &self,
        account: u32,
        external: bool,
        gap_limit: u32,
    ) -> Result<ChainDiscovery, InitialSyncError> {
        let mut found = ChainDiscovery::default();
        let mut last_used: Option<u32> = None;

        loop {
            let start = found.keys.len() as u32;
            let end = last_used.map_or(gap_limit, |used| used + 1 + gap_limit);
            if start >= end {
                break;
            }

            let batch = (start..end)
                .map(|index| self.hd_wallet.public_key(account, index, external))
                .collect::<Result<Vec<_>, _>>()?;

            let histories = try_join_all(batch.iter().map(|key| self.key_history(key))).await?;

            for (index, history) in (start..end).zip(histories) {
                if history.is_empty() {
                    continue;
                }
                last_used = Some(index);
                found.active = true;
                found
                    .block_hashes
                    .extend(history.into_iter().filter_map(|response| self.block_hash(response)));
            }

            found.keys.extend(batch);
        }

        Ok(found)
    }

    /// History of every address variant of a key.
    async fn key_history(&self, key: &PublicKey) -> Result<Vec<BlockResponse>, InitialSyncError> {
        let addresses = self.address_selector.address_variants(key);
        let histories = try_join_all(
            addresses
                .iter()
                .map(|address| self.api.get_block_hashes(address)),
        )
        .await?;

        Ok(histories.into_iter().flatten().collect())
    }

    fn block_hash(&self, response: BlockResponse) -> Option<BlockHash> {
        let checkpoint_height = self.network.checkpoint.height;
        if response.height > checkpoint_height {
            debug!(
                hash = %response.hash,
                height = response.height,
                checkpoint_height,
                "Ignoring block above checkpoint"
            );
            return None;
        }

        match Bytes32::from_reversed_hex(&response.hash) {
            Ok(header_hash) => Some(BlockHash::with_height(header_hash, response.height)),
            Err(err) => {
                warn!(hash = %response.hash, error = %err, "Malformed block hash from history index");
                None
            }
        }
    }

    fn commit(&self, discovery: Discovery) -> Result<(), InitialSyncError> {
        let block_hashes = discovery.block_hashes.len();
        let inserted = self.store.add_block_hashes(discovery.block_hashes)?;

        let accounts = discovery.key_batches.len();
        for keys in discovery.key_batches {
            self.address_manager.add_keys(keys)?;
        }
        self.address_manager.fill_gap()?;

        self.store.set_restored(true)?;

        info!(accounts, block_hashes, inserted, "Initial sync completed");
        self.peer_group.start();
        Ok(())
    }
}
