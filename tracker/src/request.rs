use bittorrent::tracker_client::{AnnounceEvent, PeerRecord, ScrapeStats};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::sync::oneshot;

#[derive(Debug, Clone)]
pub struct AnnounceQuery {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub peer_addr: SocketAddr,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub event: AnnounceEvent,
    pub num_want: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceOutcome {
    pub interval: u32,
    pub complete: u32,
    pub incomplete: u32,
    pub peers: Vec<PeerRecord>,
}

pub type ScrapeOutcome = BTreeMap<[u8; 20], ScrapeStats>;

// carries its own reply channel so the consumer loop doesn't care which transport it came from
pub enum TrackerRequest {
    Announce {
        query: AnnounceQuery,
        reply: oneshot::Sender<Result<AnnounceOutcome, String>>,
    },
    Scrape {
        info_hashes: Vec<[u8; 20]>,
        reply: oneshot::Sender<ScrapeOutcome>,
    },
}
