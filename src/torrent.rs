use crate::bitfield::Bitfield;
use crate::error::Error;
use crate::metainfo::{InfoDict, Metainfo};
use crate::peer::handshake::Handshake;
use crate::peer::message::Message;
use crate::peer::session::{PeerSession, Sender as PeerSender};
use crate::peer_id::PeerId;
use crate::storage::Storage;
use crate::tracker_client::{self, AnnounceEvent, AnnounceInfo};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::Notify;

const DEFAULT_NUM_WANT: u32 = 50;

pub struct Torrent {
    pub info_hash: [u8; 20],
    pub info: Arc<InfoDict>,
    announce_url: String,
    storage: Arc<dyn Storage>,
    local_peer_id: PeerId,
    port: u16,

    local_bitfield: Mutex<Bitfield>,
    peers: Mutex<HashMap<PeerId, PeerSender>>,

    uploaded: AtomicU64,
    downloaded: AtomicU64,
    num_want: AtomicU32,
    wake: Notify,
    shutdown: Notify,
}

impl Torrent {
    pub fn new(metainfo: &Metainfo, storage: Arc<dyn Storage>, local_peer_id: PeerId, port: u16) -> Arc<Self> {
        let n_pieces = metainfo.info.pieces.len();
        Arc::new(Self {
            info_hash: metainfo.info_hash,
            info: Arc::new(metainfo.info.clone()),
            announce_url: metainfo.announce.clone(),
            storage,
            local_peer_id,
            port,
            local_bitfield: Mutex::new(Bitfield::new(n_pieces)),
            peers: Mutex::new(HashMap::new()),
            uploaded: AtomicU64::new(0),
            downloaded: AtomicU64::new(0),
            num_want: AtomicU32::new(0),
            wake: Notify::new(),
            shutdown: Notify::new(),
        })
    }

    fn left(&self) -> u64 {
        let have: usize = self.local_bitfield.lock().unwrap().pieces().count();
        let total_pieces = self.info.pieces.len();
        if have >= total_pieces {
            return 0;
        }
        // Approximates remaining bytes; exact only when all held pieces are
        // full-length, which holds for every piece but the last.
        let full_pieces_left = (total_pieces - have).saturating_sub(1) as u64;
        full_pieces_left * self.info.piece_length
            + self.info.piece_effective_length(total_pieces - 1).unwrap_or(0)
    }

    async fn announce(&self, event: AnnounceEvent) -> Result<tracker_client::AnnounceResponse, Error> {
        let info = AnnounceInfo {
            info_hash: self.info_hash,
            peer_id: self.local_peer_id,
            ip: None,
            port: self.port,
            uploaded: self.uploaded.load(Ordering::Relaxed),
            downloaded: self.downloaded.load(Ordering::Relaxed),
            left: self.left(),
            event,
            key: Vec::new(),
            num_want: self.num_want.load(Ordering::Relaxed),
            compact: true,
        };
        tracker_client::announce(&self.announce_url, &info).await
    }

    pub fn request_more_peers(&self) {
        self.num_want.store(DEFAULT_NUM_WANT, Ordering::Relaxed);
        self.wake.notify_one();
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    pub async fn run_announcer(self: Arc<Self>) {
        let mut event = AnnounceEvent::Started;
        loop {
            let response = match self.announce(event).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(%err, info_hash = %hex::encode(self.info_hash), "announce failed, retrying next interval");
                    event = AnnounceEvent::Empty;
                    self.num_want.store(0, Ordering::Relaxed);
                    tokio::select! {
                        _ = tokio::time::sleep(std::time::Duration::from_secs(900)) => {}
                        _ = self.wake.notified() => {}
                        _ = self.shutdown.notified() => return,
                    }
                    continue;
                }
            };
            event = AnnounceEvent::Empty;
            self.num_want.store(0, Ordering::Relaxed);

            let new_peers: Vec<SocketAddrV4> = response.peers.into_iter().map(|p| p.addr).collect();
            if !new_peers.is_empty() {
                let dials = new_peers.into_iter().map(|addr| {
                    let torrent = Arc::clone(&self);
                    async move {
                        if let Err(err) = torrent.dial(addr).await {
                            tracing::debug!(%addr, %err, "failed to connect to peer");
                        }
                    }
                });
                join_all(dials).await;
            }

            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(response.interval as u64)) => {}
                _ = self.wake.notified() => {}
                _ = self.shutdown.notified() => return,
            }
        }
    }

    async fn dial(self: &Arc<Self>, addr: SocketAddrV4) -> Result<(), Error> {
        let mut stream = TcpStream::connect(addr).await?;
        let handshake = Handshake::new(self.info_hash, self.local_peer_id);
        handshake.write(&mut stream).await?;
        let reply = Handshake::read(&mut stream).await?;
        if reply.info_hash != self.info_hash {
            return Err(Error::HandshakeMismatch(format!(
                "peer at {addr} returned a different info hash"
            )));
        }
        self.spawn_session(reply.peer_id, stream).await;
        Ok(())
    }

    // caller has already read and matched the inbound handshake to this torrent
    pub async fn accept(self: &Arc<Self>, mut stream: TcpStream, remote_peer_id: PeerId) -> Result<(), Error> {
        let handshake = Handshake::new(self.info_hash, self.local_peer_id);
        handshake.write(&mut stream).await?;
        self.spawn_session(remote_peer_id, stream).await;
        Ok(())
    }

    async fn spawn_session(self: &Arc<Self>, peer_id: PeerId, stream: TcpStream) {
        let mut session = PeerSession::new(peer_id, stream, Arc::clone(&self.info), Arc::clone(&self.storage));
        self.peers.lock().unwrap().insert(peer_id, session.sender());
        let local_bitfield = self.local_bitfield.lock().unwrap().clone();
        let torrent = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = session.run(&local_bitfield).await {
                tracing::debug!(peer = %peer_id, %err, "peer session ended");
            }
            torrent.peers.lock().unwrap().remove(&peer_id);
        });
    }

    pub fn mark_piece_acquired(&self, index: usize) -> Result<(), Error> {
        self.local_bitfield.lock().unwrap().set_piece(index)?;
        let peers = self.peers.lock().unwrap();
        for sender in peers.values() {
            sender.send(Message::Have(index as u32)).ok();
        }
        Ok(())
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metainfo::Layout;
    use crate::storage::MemoryStorage;

    fn sample_metainfo() -> Metainfo {
        Metainfo {
            announce: "http://tracker.example/announce".into(),
            comment: None,
            creation_date: None,
            created_by: None,
            encoding: None,
            info: InfoDict {
                piece_length: 16 * 1024,
                pieces: vec![[0u8; 20]; 2],
                private: false,
                name: "t".into(),
                layout: Layout::SingleFile { length: 20 * 1024 },
            },
            info_hash: [9u8; 20],
        }
    }

    #[test]
    fn mark_piece_acquired_sets_local_bitfield() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(20 * 1024));
        let torrent = Torrent::new(&sample_metainfo(), storage, PeerId::new([1u8; 20]), 6881);
        torrent.mark_piece_acquired(0).unwrap();
        assert!(torrent.local_bitfield.lock().unwrap().has_piece(0));
    }

    #[test]
    fn request_more_peers_sets_num_want() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(20 * 1024));
        let torrent = Torrent::new(&sample_metainfo(), storage, PeerId::new([1u8; 20]), 6881);
        torrent.request_more_peers();
        assert_eq!(torrent.num_want.load(Ordering::Relaxed), DEFAULT_NUM_WANT);
    }

    #[test]
    fn left_is_full_length_with_no_pieces() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(20 * 1024));
        let torrent = Torrent::new(&sample_metainfo(), storage, PeerId::new([1u8; 20]), 6881);
        assert_eq!(torrent.left(), 20 * 1024);
    }

    #[test]
    fn left_is_zero_once_complete() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(20 * 1024));
        let torrent = Torrent::new(&sample_metainfo(), storage, PeerId::new([1u8; 20]), 6881);
        torrent.mark_piece_acquired(0).unwrap();
        torrent.mark_piece_acquired(1).unwrap();
        assert_eq!(torrent.left(), 0);
    }
}
