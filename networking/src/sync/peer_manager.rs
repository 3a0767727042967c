//! Peer set of the peer group.
//!
//! Holds every peer from dial to disconnect and remembers which one, if any,
//! is the sync peer.

use std::collections::BTreeMap;

use crate::peer::Peer;
use crate::types::ConnectionState;

#[derive(Debug, Default, Clone)]
pub struct PeerManager {
    peers: BTreeMap<String, Peer>,
    sync_peer: Option<String>,
}

impl PeerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer to the manager. An existing peer for the host is kept.
    pub fn add(&mut self, peer: Peer) -> &mut Peer {
        self.peers.entry(peer.host().to_string()).or_insert(peer)
    }

    pub fn get(&self, host: &str) -> Option<&Peer> {
        self.peers.get(host)
    }

    pub fn get_mut(&mut self, host: &str) -> Option<&mut Peer> {
        self.peers.get_mut(host)
    }

    /// Remove a peer. The sync peer marker is left for the caller to clear.
    pub fn peer_disconnected(&mut self, host: &str) -> Option<Peer> {
        self.peers.remove(host)
    }

    pub fn hosts(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    pub fn connected(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values().filter(|peer| peer.is_connected())
    }

    pub fn connected_count(&self) -> usize {
        self.connected().count()
    }

    /// Ready peers to hand a transaction to. With more than one ready peer
    /// only half of them get it, so the others can relay it back.
    pub fn some_ready_peers(&self) -> Vec<String> {
        let ready: Vec<String> = self
            .peers
            .values()
            .filter(|peer| peer.ready())
            .map(|peer| peer.host().to_string())
            .collect();

        if ready.len() <= 1 {
            return ready;
        }

        let half = ready.len() / 2;
        ready.into_iter().take(half).collect()
    }

    /// A connected peer that may still have blocks for us.
    pub fn non_synced_peer(&self) -> Option<String> {
        self.connected()
            .find(|peer| !peer.synced && !self.sync_peer_is(peer.host()))
            .map(|peer| peer.host().to_string())
    }

    pub fn sync_peer(&self) -> Option<&str> {
        self.sync_peer.as_deref()
    }

    pub fn sync_peer_is(&self, host: &str) -> bool {
        self.sync_peer.as_deref() == Some(host)
    }

    pub fn set_sync_peer(&mut self, host: Option<String>) {
        self.sync_peer = host;
    }

    /// Peers being dialed or connected; the pool size that counts against
    /// the target.
    pub fn total_peers_count(&self) -> usize {
        self.peers
            .values()
            .filter(|peer| {
                matches!(
                    peer.connection_state,
                    ConnectionState::Connecting | ConnectionState::Connected
                )
            })
            .count()
    }
}
