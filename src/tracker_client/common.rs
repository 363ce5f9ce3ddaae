use crate::peer_id::PeerId;
use std::net::{Ipv4Addr, SocketAddrV4};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceEvent {
    Empty,
    Started,
    Completed,
    Stopped,
}

impl AnnounceEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            AnnounceEvent::Empty => "empty",
            AnnounceEvent::Started => "started",
            AnnounceEvent::Completed => "completed",
            AnnounceEvent::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnnounceInfo {
    pub info_hash: [u8; 20],
    pub peer_id: PeerId,
    pub ip: Option<Ipv4Addr>,
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub event: AnnounceEvent,
    pub key: Vec<u8>,
    pub num_want: u32,
    pub compact: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub addr: SocketAddrV4,
    pub peer_id: Option<PeerId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceResponse {
    pub interval: u32,
    pub complete: u32,
    pub incomplete: u32,
    pub peers: Vec<PeerRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeStats {
    pub complete: u32,
    pub downloaded: u32,
    pub incomplete: u32,
}

// 4-byte ipv4 || 2-byte big-endian port, repeated
pub fn decode_compact_peers(bytes: &[u8]) -> Result<Vec<PeerRecord>, crate::error::Error> {
    if bytes.len() % 6 != 0 {
        return Err(crate::error::Error::TrackerRejected(format!(
            "compact peers length {} is not a multiple of 6",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            PeerRecord {
                addr: SocketAddrV4::new(ip, port),
                peer_id: None,
            }
        })
        .collect())
}

pub fn encode_compact_peers(peers: &[PeerRecord]) -> Vec<u8> {
    let mut out = Vec::with_capacity(6 * peers.len());
    for peer in peers {
        out.extend_from_slice(&peer.addr.ip().octets());
        out.extend_from_slice(&peer.addr.port().to_be_bytes());
    }
    out
}
