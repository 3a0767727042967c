use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::debug;

use super::config::MAX_KNOWN_HOSTS;
use crate::seeds::SeedSource;

#[derive(Debug, Clone, Default)]
struct HostRecord {
    score: i32,
    retry_after: Option<Instant>,
}

/// Candidate hosts for new connections, independent of live peers.
///
/// Gossiped hosts are ranked by score; seed hosts are the fallback. Hosts in
/// use or backing off after an error are never handed out.
#[derive(Debug, Clone)]
pub struct PeerHostManager {
    seeds: Vec<String>,
    known: Vec<String>,
    known_index: HashSet<String>,
    records: HashMap<String, HostRecord>,
    in_use: HashSet<String>,
    retry_backoff: Duration,
}

impl PeerHostManager {
    pub fn new(seeds: &dyn SeedSource, retry_backoff: Duration) -> Self {
        Self {
            seeds: seeds.to_hosts(),
            known: Vec::new(),
            known_index: HashSet::new(),
            records: HashMap::new(),
            in_use: HashSet::new(),
            retry_backoff,
        }
    }

    /// Merge hosts learned from `addr` gossip.
    pub fn add_hosts(&mut self, hosts: Vec<String>) {
        let mut added = 0;
        let mut dropped = 0;
        for host in hosts {
            if self.known_index.contains(&host) || self.seeds.contains(&host) {
                continue;
            }
            if self.known.len() >= MAX_KNOWN_HOSTS && !self.evict_failed_host() {
                dropped += 1;
                continue;
            }
            self.records.entry(host.clone()).or_default();
            self.known_index.insert(host.clone());
            self.known.push(host);
            added += 1;
        }
        if added > 0 || dropped > 0 {
            debug!(added, dropped, known = self.known.len(), "Hosts added");
        }
    }

    /// Forget the worst scored gossiped host that has failed and is not in
    /// use. Returns false when there is none.
    fn evict_failed_host(&mut self) -> bool {
        let Some(position) = self
            .known
            .iter()
            .enumerate()
            .filter(|(_, host)| !self.in_use.contains(*host) && self.score(host) < 0)
            .min_by_key(|(_, host)| self.score(host))
            .map(|(position, _)| position)
        else {
            return false;
        };

        let host = self.known.remove(position);
        self.known_index.remove(&host);
        self.records.remove(&host);
        debug!(host = %host, "Evicted failed host");
        true
    }

    /// Hand out a host to dial and mark it in use.
    pub fn peer_host(&mut self, now: Instant) -> Option<String> {
        let best_known = self
            .known
            .iter()
            .filter(|host| self.is_available(host, now))
            .fold(None::<(&String, i32)>, |best, host| {
                let score = self.score(host);
                match best {
                    Some((_, best_score)) if best_score >= score => best,
                    _ => Some((host, score)),
                }
            })
            .map(|(host, _)| host.clone());

        let host = best_known.or_else(|| {
            self.seeds
                .iter()
                .find(|host| self.is_available(host, now))
                .cloned()
        })?;

        self.in_use.insert(host.clone());
        Some(host)
    }

    /// Score a host after its connection ended. Failures caused by our own
    /// network being down are not the host's fault and change nothing.
    pub fn host_disconnected(
        &mut self,
        host: &str,
        failed: bool,
        network_reachable: bool,
        now: Instant,
    ) {
        self.in_use.remove(host);

        if !network_reachable {
            return;
        }

        let retry_backoff = self.retry_backoff;
        let record = self.records.entry(host.to_string()).or_default();
        if failed {
            record.score -= 1;
            record.retry_after = Some(now + retry_backoff);
        } else {
            record.score += 1;
            record.retry_after = None;
        }
        debug!(host, score = record.score, failed, "Host scored");
    }

    /// Hosts learned from gossip, in arrival order.
    pub fn known_hosts(&self) -> &[String] {
        &self.known
    }

    pub fn score(&self, host: &str) -> i32 {
        self.records.get(host).map_or(0, |record| record.score)
    }

    pub fn is_in_use(&self, host: &str) -> bool {
        self.in_use.contains(host)
    }

    fn is_available(&self, host: &str, now: Instant) -> bool {
        if self.in_use.contains(host) {
            return false;
        }
        self.records
            .get(host)
            .and_then(|record| record.retry_after)
            .map_or(true, |retry_after| now >= retry_after)
    }
}
