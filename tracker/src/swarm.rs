use crate::request::{AnnounceOutcome, AnnounceQuery, TrackerRequest};
use bittorrent::peer_id::PeerId;
use bittorrent::tracker_client::{AnnounceEvent, PeerRecord, ScrapeStats};
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

const DEFAULT_NUM_WANT: u32 = 50;
const MAX_NUM_WANT: u32 = 200;
const ANNOUNCE_INTERVAL: u32 = 1800;
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

struct PeerEntry {
    peer_id: [u8; 20],
    is_seeder: bool,
    last_updated: Instant,
}

#[derive(Default)]
struct Swarm {
    peers: HashMap<SocketAddr, PeerEntry>,
    completed: u32,
}

impl Swarm {
    fn counts(&self) -> (u32, u32) {
        let complete = self.peers.values().filter(|p| p.is_seeder).count() as u32;
        (complete, self.peers.len() as u32 - complete)
    }
}

// keyed by info hash. only run_consumer touches this, so no interior mutability needed
pub struct SwarmTable {
    swarms: HashMap<[u8; 20], Swarm>,
    filter: Option<HashSet<[u8; 20]>>,
}

impl SwarmTable {
    pub fn new(filter: Option<HashSet<[u8; 20]>>) -> Self {
        Self { swarms: HashMap::new(), filter }
    }

    fn accepts(&self, info_hash: &[u8; 20]) -> bool {
        self.filter.as_ref().is_none_or(|allowed| allowed.contains(info_hash))
    }

    fn announce(&mut self, query: AnnounceQuery) -> Result<AnnounceOutcome, String> {
        if !self.accepts(&query.info_hash) {
            return Err("info_hash not served by this tracker".into());
        }
        let swarm = self.swarms.entry(query.info_hash).or_default();

        if query.event == AnnounceEvent::Stopped {
            swarm.peers.remove(&query.peer_addr);
            let (complete, incomplete) = swarm.counts();
            return Ok(AnnounceOutcome { interval: ANNOUNCE_INTERVAL, complete, incomplete, peers: Vec::new() });
        }

        let is_seeder = query.event == AnnounceEvent::Completed || query.left == 0;
        let was_seeder = swarm.peers.get(&query.peer_addr).is_some_and(|p| p.is_seeder);
        if query.event == AnnounceEvent::Completed && !was_seeder {
            swarm.completed += 1;
        }
        swarm.peers.insert(
            query.peer_addr,
            PeerEntry { peer_id: query.peer_id, is_seeder, last_updated: Instant::now() },
        );

        let num_want = query.num_want.unwrap_or(DEFAULT_NUM_WANT).min(MAX_NUM_WANT) as usize;
        let mut candidates: Vec<PeerRecord> = swarm
            .peers
            .iter()
            .filter(|(addr, _)| **addr != query.peer_addr)
            .filter_map(|(addr, entry)| match addr {
                SocketAddr::V4(addr) => Some(PeerRecord { addr: *addr, peer_id: Some(PeerId::new(entry.peer_id)) }),
                SocketAddr::V6(_) => None,
            })
            .collect();
        let n = num_want.min(candidates.len());
        let (chosen, _) = candidates.partial_shuffle(&mut rand::rng(), n);
        let peers = chosen.to_vec();

        let (complete, incomplete) = swarm.counts();
        Ok(AnnounceOutcome { interval: ANNOUNCE_INTERVAL, complete, incomplete, peers })
    }

    fn scrape(&self, info_hashes: &[[u8; 20]]) -> crate::request::ScrapeOutcome {
        let hashes: Vec<[u8; 20]> = if info_hashes.is_empty() {
            self.swarms.keys().copied().collect()
        } else {
            info_hashes.to_vec()
        };
        hashes
            .into_iter()
            .map(|hash| {
                let stats = self
                    .swarms
                    .get(&hash)
                    .map(|swarm| {
                        let (complete, incomplete) = swarm.counts();
                        ScrapeStats { complete, downloaded: swarm.completed, incomplete }
                    })
                    .unwrap_or(ScrapeStats { complete: 0, downloaded: 0, incomplete: 0 });
                (hash, stats)
            })
            .collect()
    }

    fn sweep(&mut self, max_age: Duration) {
        for swarm in self.swarms.values_mut() {
            swarm.peers.retain(|_, entry| entry.last_updated.elapsed() < max_age);
        }
    }

    #[cfg(test)]
    fn peer_count(&self, info_hash: &[u8; 20]) -> usize {
        self.swarms.get(info_hash).map(|s| s.peers.len()).unwrap_or(0)
    }
}

// drains both http- and udp-sourced requests from a single channel
pub async fn run_consumer(mut table: SwarmTable, mut requests: mpsc::Receiver<TrackerRequest>) {
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(request) = request else { return };
                match request {
                    TrackerRequest::Announce { query, reply } => {
                        reply.send(table.announce(query)).ok();
                    }
                    TrackerRequest::Scrape { info_hashes, reply } => {
                        reply.send(table.scrape(&info_hashes)).ok();
                    }
                }
            }
            _ = sweep.tick() => {
                table.sweep(SWEEP_INTERVAL);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(info_hash: [u8; 20], addr: &str, left: u64, event: AnnounceEvent) -> AnnounceQuery {
        AnnounceQuery {
            info_hash,
            peer_id: [1u8; 20],
            peer_addr: addr.parse().unwrap(),
            uploaded: 0,
            downloaded: 0,
            left,
            event,
            num_want: None,
        }
    }

    #[test]
    fn announce_never_returns_the_requester() {
        let mut table = SwarmTable::new(None);
        table.announce(query([1u8; 20], "10.0.0.1:1", 1, AnnounceEvent::Started)).unwrap();
        let outcome = table.announce(query([1u8; 20], "10.0.0.2:1", 1, AnnounceEvent::Started)).unwrap();
        assert!(outcome.peers.iter().all(|p| p.addr.to_string() != "10.0.0.2:1"));
    }

    #[test]
    fn left_zero_counts_as_seeder() {
        let mut table = SwarmTable::new(None);
        table.announce(query([2u8; 20], "10.0.0.1:1", 0, AnnounceEvent::Started)).unwrap();
        let outcome = table.scrape(&[[2u8; 20]]);
        assert_eq!(outcome[&[2u8; 20]].complete, 1);
        assert_eq!(outcome[&[2u8; 20]].incomplete, 0);
    }

    #[test]
    fn stopped_event_removes_the_peer() {
        let mut table = SwarmTable::new(None);
        table.announce(query([3u8; 20], "10.0.0.1:1", 1, AnnounceEvent::Started)).unwrap();
        table.announce(query([3u8; 20], "10.0.0.1:1", 1, AnnounceEvent::Stopped)).unwrap();
        assert_eq!(table.peer_count(&[3u8; 20]), 0);
    }

    #[test]
    fn completed_event_increments_download_count_once() {
        let mut table = SwarmTable::new(None);
        table.announce(query([4u8; 20], "10.0.0.1:1", 1, AnnounceEvent::Started)).unwrap();
        table.announce(query([4u8; 20], "10.0.0.1:1", 0, AnnounceEvent::Completed)).unwrap();
        table.announce(query([4u8; 20], "10.0.0.1:1", 0, AnnounceEvent::Completed)).unwrap();
        let outcome = table.scrape(&[[4u8; 20]]);
        assert_eq!(outcome[&[4u8; 20]].downloaded, 1);
    }

    #[test]
    fn filter_list_rejects_unlisted_hashes() {
        let mut allowed = HashSet::new();
        allowed.insert([5u8; 20]);
        let mut table = SwarmTable::new(Some(allowed));
        assert!(table.announce(query([6u8; 20], "10.0.0.1:1", 1, AnnounceEvent::Started)).is_err());
    }

    #[test]
    fn sweep_evicts_stale_peers() {
        let mut table = SwarmTable::new(None);
        table.announce(query([7u8; 20], "10.0.0.1:1", 1, AnnounceEvent::Started)).unwrap();
        table.sweep(Duration::from_secs(0));
        assert_eq!(table.peer_count(&[7u8; 20]), 0);
    }

    #[test]
    fn empty_scrape_request_returns_all_swarms() {
        let mut table = SwarmTable::new(None);
        table.announce(query([8u8; 20], "10.0.0.1:1", 1, AnnounceEvent::Started)).unwrap();
        table.announce(query([9u8; 20], "10.0.0.1:1", 1, AnnounceEvent::Started)).unwrap();
        assert_eq!(table.scrape(&[]).len(), 2);
    }
}
