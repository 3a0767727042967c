use std::path::Path;

use anyhow::{anyhow, Context, Result};
use containers::{Bytes32, Checkpoint};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const MAIN_NET_CHECKPOINT_HEIGHT: u32 = 500_000;
pub const MAIN_NET_CHECKPOINT_HASH: Bytes32 = match Bytes32::parse_reversed(
    "00000000000000000024fb37364cbf81fd49cc2d51c09c75c35433c3a1945d04",
) {
    Some(x) => x,
    None => panic!(),
};

pub const TEST_NET_GENESIS_HASH: Bytes32 = match Bytes32::parse_reversed(
    "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943",
) {
    Some(x) => x,
    None => panic!(),
};

pub const REG_TEST_GENESIS_HASH: Bytes32 = match Bytes32::parse_reversed(
    "0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206",
) {
    Some(x) => x,
    None => panic!(),
};

pub const MAIN_NET_PORT: u16 = 8333;
pub const TEST_NET_PORT: u16 = 18333;
pub const REG_TEST_PORT: u16 = 18444;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    MainNet,
    TestNet,
    RegTest,
}

/// Per-network constants the sync core depends on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkParams {
    pub kind: NetworkKind,
    pub checkpoint: Checkpoint,
    pub pub_key_hash: u8,
    pub script_hash: u8,
    /// Whether a remote history index exists for this network. When it does
    /// not, wallet bootstrap is skipped and sync starts from the checkpoint.
    pub syncable_from_api: bool,
    pub port: u16,
    pub seed_hosts: Vec<String>,
}

impl NetworkParams {
    pub fn main_net() -> Self {
        Self {
            kind: NetworkKind::MainNet,
            checkpoint: Checkpoint::new(MAIN_NET_CHECKPOINT_HASH, MAIN_NET_CHECKPOINT_HEIGHT),
            pub_key_hash: 0x00,
            script_hash: 0x05,
            syncable_from_api: true,
            port: MAIN_NET_PORT,
            seed_hosts: vec![
                "seed.bitcoin.sipa.be".to_string(),
                "dnsseed.bluematt.me".to_string(),
                "dnsseed.bitcoin.dashjr.org".to_string(),
                "seed.bitcoinstats.com".to_string(),
                "seed.btc.petertodd.org".to_string(),
            ],
        }
    }

    pub fn test_net() -> Self {
        Self {
            kind: NetworkKind::TestNet,
            checkpoint: Checkpoint::new(TEST_NET_GENESIS_HASH, 0),
            pub_key_hash: 0x6f,
            script_hash: 0xc4,
            syncable_from_api: false,
            port: TEST_NET_PORT,
            seed_hosts: vec![
                "testnet-seed.bitcoin.petertodd.org".to_string(),
                "testnet-seed.bluematt.me".to_string(),
                "testnet-seed.bitcoin.schildbach.de".to_string(),
            ],
        }
    }

    pub fn reg_test() -> Self {
        Self {
            kind: NetworkKind::RegTest,
            checkpoint: Checkpoint::new(REG_TEST_GENESIS_HASH, 0),
            pub_key_hash: 0x6f,
            script_hash: 0xc4,
            syncable_from_api: false,
            port: REG_TEST_PORT,
            seed_hosts: vec!["127.0.0.1".to_string()],
        }
    }

    pub fn for_kind(kind: NetworkKind) -> Self {
        match kind {
            NetworkKind::MainNet => Self::main_net(),
            NetworkKind::TestNet => Self::test_net(),
            NetworkKind::RegTest => Self::reg_test(),
        }
    }

    /// Load network parameters from a YAML file.
    ///
    /// Only `network` is required; the other keys override the built-in
    /// defaults for that network.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open network config {}", path.display()))?;
        let raw: NetworkFile = serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse network config {}", path.display()))?;

        let params = raw.into_params()?;

        info!(
            network = ?params.kind,
            checkpoint_height = params.checkpoint.height,
            checkpoint_hash = %params.checkpoint.header_hash,
            seeds = params.seed_hosts.len(),
            "Network config loaded"
        );

        Ok(params)
    }
}

#[derive(Debug, Deserialize)]
struct NetworkFile {
    network: NetworkKind,
    #[serde(default)]
    checkpoint: Option<CheckpointFile>,
    #[serde(default)]
    seed_hosts: Option<Vec<String>>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    syncable_from_api: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CheckpointFile {
    hash: String,
    height: u32,
}

impl NetworkFile {
    fn into_params(self) -> Result<NetworkParams> {
        let mut params = NetworkParams::for_kind(self.network);

        if let Some(checkpoint) = self.checkpoint {
            let header_hash = Bytes32::from_reversed_hex(&checkpoint.hash)
                .map_err(|e| anyhow!("invalid checkpoint hash {:?}: {}", checkpoint.hash, e))?;
            params.checkpoint = Checkpoint::new(header_hash, checkpoint.height);
        }
        if let Some(seed_hosts) = self.seed_hosts {
            params.seed_hosts = seed_hosts;
        }
        if let Some(port) = self.port {
            params.port = port;
        }
        if let Some(syncable) = self.syncable_from_api {
            params.syncable_from_api = syncable;
        }

        Ok(params)
    }
}
