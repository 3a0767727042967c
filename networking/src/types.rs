use containers::{
    BloomFilter, Bytes32, InventoryItem, MerkleBlock, NetworkAddress, Transaction,
};
use serde::Serialize;

use crate::error::PeerGroupError;

/// Peer connection state machine.
///
/// Tracks the lifecycle of a connection to a peer:
/// CONNECTING -> CONNECTED -> DISCONNECTING -> DISCONNECTED
///
/// `Disconnecting` is set when the group itself asked the transport to drop
/// the peer; the peer is removed once the transport reports the disconnect.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No active connection to this peer.
    Disconnected,
    /// Dial in progress.
    Connecting,
    /// Handshake done, can exchange protocol messages.
    Connected,
    /// Drop requested by the group, waiting for the transport.
    Disconnecting,
}

/// Messages a peer delivers to the group, already decoded by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Inventory(Vec<InventoryItem>),
    MerkleBlock(MerkleBlock),
    Transaction(Transaction),
    GetData(Vec<InventoryItem>),
    Addresses(Vec<NetworkAddress>),
    Pong(u64),
}

impl InboundMessage {
    pub fn command(&self) -> &'static str {
        match self {
            InboundMessage::Inventory(_) => "inv",
            InboundMessage::MerkleBlock(_) => "merkleblock",
            InboundMessage::Transaction(_) => "tx",
            InboundMessage::GetData(_) => "getdata",
            InboundMessage::Addresses(_) => "addr",
            InboundMessage::Pong(_) => "pong",
        }
    }
}

/// Messages the group asks the transport to send to one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    FilterLoad(BloomFilter),
    GetBlocks { locator: Vec<Bytes32> },
    GetData(Vec<InventoryItem>),
    Inventory(Vec<InventoryItem>),
    Transaction(Transaction),
    MemPool,
    Ping(u64),
}

impl OutboundMessage {
    pub fn command(&self) -> &'static str {
        match self {
            OutboundMessage::FilterLoad(_) => "filterload",
            OutboundMessage::GetBlocks { .. } => "getblocks",
            OutboundMessage::GetData(_) => "getdata",
            OutboundMessage::Inventory(_) => "inv",
            OutboundMessage::Transaction(_) => "tx",
            OutboundMessage::MemPool => "mempool",
            OutboundMessage::Ping(_) => "ping",
        }
    }
}

/// The socket side of the peer group.
///
/// Calls must not block; implementations queue the work and report results
/// back through `PeerGroupHandle`.
pub trait PeerTransport: Send + Sync {
    fn connect(&self, host: &str);
    fn send(&self, host: &str, message: OutboundMessage);
    fn disconnect(&self, host: &str, error: Option<PeerGroupError>);
}

pub trait BloomFilterProvider: Send + Sync {
    fn bloom_filter(&self) -> Option<BloomFilter>;
}

impl BloomFilterProvider for Option<BloomFilter> {
    fn bloom_filter(&self) -> Option<BloomFilter> {
        self.clone()
    }
}

pub trait NetworkReachability: Send + Sync {
    fn is_reachable(&self) -> bool;
}

impl NetworkReachability for bool {
    fn is_reachable(&self) -> bool {
        *self
    }
}

/// What the wallet bootstrap sees of the peer group.
pub trait PeerGroupControl: Send + Sync {
    fn start(&self);
    fn stop(&self);
}

/// Observer of sync progress. Every method defaults to a no-op.
pub trait SyncStateListener: Send + Sync {
    fn sync_started(&self) {}
    fn sync_stopped(&self) {}
    fn sync_finished(&self) {}
    fn best_block_height_updated(&self, _height: u32, _max_block_height: u32) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl SyncStateListener for NoopListener {}
