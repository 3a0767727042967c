//! Sync configuration constants and the peer group's tunables.
//!
//! Protocol limits are constants; pool size and timings are `PeerGroupConfig`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

/// Maximum filtered blocks requested in one `getdata`.
pub const MAX_MERKLE_BLOCKS_PER_REQUEST: usize = 500;

/// Peers answer `getblocks` with at most this many hashes.
pub const MAX_BLOCK_HASHES_PER_RESPONSE: usize = 500;

/// Number of stored blocks placed in a block locator before the checkpoint.
pub const MAX_LOCATOR_BLOCKS: usize = 10;

/// Minimum batch a `getblocks` answer must have to be accepted before the
/// pong, when the sync peer claims the same height as ours. A tip
/// announcement of one or two blocks is not mistaken for the answer.
pub const EXPECTED_HASHES_MIN_AT_TIP: usize = 6;

/// Upper bound on the transaction count a merkle block may claim
/// (maximum block size over minimum transaction size).
pub const MAX_TRANSACTIONS_PER_BLOCK: u32 = 1_000_000 / 60;

/// Gossiped hosts kept as dial candidates. Past this, a new host only gets in
/// by evicting a host with a negative score.
pub const MAX_KNOWN_HOSTS: usize = 1000;

pub const DEFAULT_MAX_PEERS: usize = 10;
pub const DEFAULT_RECONNECT_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_HOST_RETRY_BACKOFF_SECS: u64 = 60;
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PeerGroupConfig {
    /// Target number of connecting plus connected peers.
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,
    #[serde(default = "default_host_retry_backoff_secs")]
    pub host_retry_backoff_secs: u64,
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
}

fn default_max_peers() -> usize {
    DEFAULT_MAX_PEERS
}

fn default_reconnect_interval_secs() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_SECS
}

fn default_host_retry_backoff_secs() -> u64 {
    DEFAULT_HOST_RETRY_BACKOFF_SECS
}

fn default_task_timeout_secs() -> u64 {
    DEFAULT_TASK_TIMEOUT_SECS
}

impl Default for PeerGroupConfig {
    fn default() -> Self {
        Self {
            max_peers: DEFAULT_MAX_PEERS,
            reconnect_interval_secs: DEFAULT_RECONNECT_INTERVAL_SECS,
            host_retry_backoff_secs: DEFAULT_HOST_RETRY_BACKOFF_SECS,
            task_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
        }
    }
}

impl PeerGroupConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open peer group config {}", path.display()))?;
        let config: PeerGroupConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse peer group config {}", path.display()))?;

        info!(
            max_peers = config.max_peers,
            reconnect_interval_secs = config.reconnect_interval_secs,
            task_timeout_secs = config.task_timeout_secs,
            "Peer group config loaded"
        );

        Ok(config)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs.max(1))
    }

    pub fn host_retry_backoff(&self) -> Duration {
        Duration::from_secs(self.host_retry_backoff_secs)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}
