use crate::metainfo::Metainfo;
use crate::nat::NatMapper;
use crate::peer::handshake::Handshake;
use crate::peer_id::PeerId;
use crate::storage::Storage;
use crate::torrent::Torrent;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};

pub struct Client {
    listener: TcpListener,
    peer_id: PeerId,
    nat: Box<dyn NatMapper>,
    torrents: Mutex<HashMap<[u8; 20], Arc<Torrent>>>,
}

impl Client {
    // port = 0 asks the OS for an ephemeral port
    pub async fn bind(port: u16, peer_id_prefix: &[u8], nat: Box<dyn NatMapper>) -> io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        Ok(Self {
            listener,
            peer_id: PeerId::generate(peer_id_prefix),
            nat,
            torrents: Mutex::new(HashMap::new()),
        })
    }

    pub fn local_port(&self) -> io::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub async fn map_port(&self) {
        let Ok(port) = self.local_port() else { return };
        match self.nat.get_ip_addrs_and_map_port(port).await {
            Ok((internal, external)) => {
                tracing::info!(%internal, %external, "mapped external port via NAT collaborator");
            }
            Err(err) => {
                tracing::debug!(%err, "NAT mapping failed, proceeding with unmapped address");
            }
        }
    }

    pub fn add_torrent(self: &Arc<Self>, metainfo: &Metainfo, storage: Arc<dyn Storage>) -> Arc<Torrent> {
        let port = self.local_port().unwrap_or(0);
        let torrent = Torrent::new(metainfo, storage, self.peer_id, port);
        self.torrents
            .lock()
            .unwrap()
            .insert(metainfo.info_hash, Arc::clone(&torrent));
        tokio::spawn(Arc::clone(&torrent).run_announcer());
        torrent
    }

    pub fn remove_torrent(&self, info_hash: &[u8; 20]) {
        if let Some(torrent) = self.torrents.lock().unwrap().remove(info_hash) {
            torrent.shutdown();
        }
    }

    fn lookup(&self, info_hash: &[u8; 20]) -> Option<Arc<Torrent>> {
        self.torrents.lock().unwrap().get(info_hash).cloned()
    }

    pub async fn run_accept_loop(self: Arc<Self>) -> io::Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let client = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(err) = client.accept_one(stream).await {
                    tracing::debug!(%addr, %err, "inbound handshake failed");
                }
            });
        }
    }

    async fn accept_one(&self, mut stream: TcpStream) -> Result<(), crate::error::Error> {
        let handshake = Handshake::read(&mut stream).await?;
        let Some(torrent) = self.lookup(&handshake.info_hash) else {
            return Err(crate::error::Error::HandshakeMismatch(
                "no registered torrent for this info hash".into(),
            ));
        };
        torrent.accept(stream, handshake.peer_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nat::NoopNat;

    #[tokio::test]
    async fn bind_picks_an_ephemeral_port_when_zero() {
        let client = Client::bind(0, b"-RT0001-", Box::new(NoopNat)).await.unwrap();
        assert_ne!(client.local_port().unwrap(), 0);
    }

    #[tokio::test]
    async fn map_port_does_not_panic_with_noop_nat() {
        let client = Client::bind(0, b"-RT0001-", Box::new(NoopNat)).await.unwrap();
        client.map_port().await;
    }
}
