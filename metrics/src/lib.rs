use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),
    #[error("metrics output is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    peers: IntGauge,
    peer_connection_events: IntCounterVec,
    peer_disconnection_events: IntCounterVec,
    // Sync
    best_block_height: IntGauge,
    merkle_blocks: IntCounterVec,
    sync_rounds: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let peers = IntGauge::with_opts(Opts::new("spv_peers_connected", "Number of connected peers"))?;
        registry.register(Box::new(peers.clone()))?;

        // Network
        let peer_connection_events = IntCounterVec::new(
            Opts::new("spv_peer_connection_events_total", "Total number of peer connection events"),
            &["result"],
        )?;
        registry.register(Box::new(peer_connection_events.clone()))?;

        let peer_disconnection_events = IntCounterVec::new(
            Opts::new("spv_peer_disconnection_events_total", "Total number of peer disconnection events"),
            &["reason"],
        )?;
        registry.register(Box::new(peer_disconnection_events.clone()))?;

        // Sync
        let best_block_height = IntGauge::with_opts(Opts::new(
            "spv_best_block_height",
            "Height of the best locally known block",
        ))?;
        registry.register(Box::new(best_block_height.clone()))?;

        let merkle_blocks = IntCounterVec::new(
            Opts::new("spv_merkle_blocks_total", "Total number of merkle blocks handled"),
            &["result"],
        )?;
        registry.register(Box::new(merkle_blocks.clone()))?;

        let sync_rounds = IntCounterVec::new(
            Opts::new("spv_sync_rounds_total", "Total number of sync peer download rounds"),
            &["result"],
        )?;
        registry.register(Box::new(sync_rounds.clone()))?;

        Ok(Self {
            registry,
            peers,
            peer_connection_events,
            peer_disconnection_events,
            best_block_height,
            merkle_blocks,
            sync_rounds,
        })
    }

    pub fn gather(&self) -> Result<String, MetricsError> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn set_peers(&self, v: i64) {
        self.peers.set(v);
    }

    // Network
    pub fn inc_peer_connection(&self, result: &str) {
        self.peer_connection_events.with_label_values(&[result]).inc();
    }

    pub fn inc_peer_disconnection(&self, reason: &str) {
        self.peer_disconnection_events.with_label_values(&[reason]).inc();
    }

    // Sync
    pub fn set_best_block_height(&self, v: i64) {
        self.best_block_height.set(v);
    }

    pub fn inc_merkle_blocks(&self, result: &str) {
        self.merkle_blocks.with_label_values(&[result]).inc();
    }

    pub fn inc_sync_rounds(&self, result: &str) {
        self.sync_rounds.with_label_values(&[result]).inc();
    }
}

pub type SharedMetrics = Arc<Metrics>;
