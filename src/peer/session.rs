use crate::bitfield::Bitfield;
use crate::error::Error;
use crate::metainfo::InfoDict;
use crate::peer::message::{Message, MessageCodec};
use crate::peer_id::PeerId;
use crate::piece;
use crate::storage::Storage;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

pub type Sender = mpsc::UnboundedSender<Message>;

pub struct PeerState {
    pub is_choking: bool,
    pub is_interested: bool,
    pub am_choking: bool,
    pub am_interested: bool,
}

impl Default for PeerState {
    fn default() -> Self {
        Self {
            is_choking: true,
            is_interested: false,
            am_choking: true,
            am_interested: false,
        }
    }
}

pub struct PeerSession {
    pub peer_id: PeerId,
    read: SplitStream<Framed<TcpStream, MessageCodec>>,
    out_tx: Sender,
    out_rx: Option<mpsc::UnboundedReceiver<Message>>,
    write: Option<SplitSink<Framed<TcpStream, MessageCodec>, Message>>,
    state: PeerState,
    bitfield: Bitfield,
    bitfield_received: bool,
    info: Arc<InfoDict>,
    storage: Arc<dyn Storage>,
}

impl PeerSession {
    pub fn new(peer_id: PeerId, stream: TcpStream, info: Arc<InfoDict>, storage: Arc<dyn Storage>) -> Self {
        let (write, read) = Framed::new(stream, MessageCodec).split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let n_pieces = info.pieces.len();
        Self {
            peer_id,
            read,
            out_tx,
            out_rx: Some(out_rx),
            write: Some(write),
            state: PeerState::default(),
            bitfield: Bitfield::new(n_pieces),
            bitfield_received: false,
            info,
            storage,
        }
    }

    pub fn sender(&self) -> Sender {
        self.out_tx.clone()
    }

    pub fn has_piece(&self, index: usize) -> bool {
        self.bitfield.has_piece(index)
    }

    pub fn set_am_choking(&mut self, choking: bool) {
        self.state.am_choking = choking;
    }

    #[tracing::instrument(skip(self, local_bitfield), fields(peer = %self.peer_id))]
    pub async fn run(&mut self, local_bitfield: &Bitfield) -> Result<(), Error> {
        let mut write = self.write.take().expect("run called once");
        let mut out_rx = self.out_rx.take().expect("run called once");
        self.out_tx
            .send(Message::Bitfield(local_bitfield.as_bytes().to_vec()))
            .ok();

        let writer = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                if write.send(message).await.is_err() {
                    break;
                }
            }
        });

        let result = self.read_loop().await;
        writer.abort();
        result
    }

    async fn read_loop(&mut self) -> Result<(), Error> {
        while let Some(message) = self.read.next().await.transpose()? {
            self.handle(message).await?;
        }
        Ok(())
    }

    async fn handle(&mut self, message: Message) -> Result<(), Error> {
        match message {
            Message::Choke => self.state.is_choking = true,
            Message::Unchoke => self.state.is_choking = false,
            Message::Interested => self.state.is_interested = true,
            Message::NotInterested => self.state.is_interested = false,
            Message::Have(index) => {
                if index as usize >= self.info.pieces.len() {
                    return Err(Error::ProtocolViolation(format!(
                        "have({index}) exceeds {} pieces",
                        self.info.pieces.len()
                    )));
                }
                self.bitfield.set_piece(index as usize)?;
            }
            Message::Bitfield(payload) => {
                if self.bitfield_received {
                    return Err(Error::ProtocolViolation(
                        "bitfield sent more than once".into(),
                    ));
                }
                self.bitfield = Bitfield::from_payload(payload, self.info.pieces.len())?;
                self.bitfield_received = true;
            }
            Message::Request { index, offset, length } => {
                self.handle_request(index, offset, length).await?;
            }
            Message::Piece { index, offset, block } => {
                self.handle_piece(index, offset, block).await;
            }
            Message::Cancel { index, offset, length } => {
                tracing::debug!(index, offset, length, "cancel received");
            }
        }
        Ok(())
    }

    async fn handle_request(&mut self, index: u32, offset: u32, length: u32) -> Result<(), Error> {
        piece::validate_request(&self.info, index, offset, length)?;
        if self.state.am_choking {
            return Ok(());
        }
        let absolute_offset = u64::from(index) * self.info.piece_length + u64::from(offset);
        let Some(block) = self.storage.get(absolute_offset, u64::from(length)).await else {
            return Ok(());
        };
        self.out_tx
            .send(Message::Piece { index, offset, block })
            .map_err(|_| Error::ProtocolViolation("peer writer task is gone".into()))
    }

    async fn handle_piece(&mut self, index: u32, offset: u32, block: Vec<u8>) {
        if let Err(err) = piece::validate_piece(&self.info, index, offset, block.len() as u32) {
            tracing::warn!(%err, "rejected invalid piece message");
            return;
        }
        let absolute_offset = u64::from(index) * self.info.piece_length + u64::from(offset);
        if !self.storage.set(absolute_offset, &block).await {
            tracing::warn!(index, offset, "storage write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metainfo::Layout;
    use crate::storage::MemoryStorage;
    use tokio::net::TcpListener;

    fn info() -> Arc<InfoDict> {
        Arc::new(InfoDict {
            piece_length: 16 * 1024,
            pieces: vec![[0u8; 20]; 2],
            private: false,
            name: "t".into(),
            layout: Layout::SingleFile { length: 32 * 1024 },
        })
    }

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let accept = listener.accept();
        let (client, accept_result) = tokio::join!(connect, accept);
        let (server, _) = accept_result.unwrap();
        (client.unwrap(), server)
    }

    #[tokio::test]
    async fn sends_local_bitfield_first() {
        let (client, server) = connected_pair().await;
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(32 * 1024));
        let mut session = PeerSession::new(PeerId::new([1u8; 20]), server, info(), storage);
        let mut local_bitfield = Bitfield::new(2);
        local_bitfield.set_piece(0).unwrap();
        tokio::spawn(async move {
            let _ = session.run(&local_bitfield).await;
        });

        let mut framed = Framed::new(client, MessageCodec);
        let first = framed.next().await.unwrap().unwrap();
        assert_eq!(first, Message::Bitfield(vec![0b1000_0000]));
    }

    #[tokio::test]
    async fn choked_request_is_dropped() {
        let (client, server) = connected_pair().await;
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(32 * 1024));
        let mut session = PeerSession::new(PeerId::new([1u8; 20]), server, info(), storage);
        tokio::spawn(async move {
            let _ = session.run(&Bitfield::new(2)).await;
        });

        let mut framed = Framed::new(client, MessageCodec);
        let _bitfield = framed.next().await.unwrap().unwrap();
        framed
            .send(Message::Request { index: 0, offset: 0, length: 16 * 1024 })
            .await
            .unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_millis(50), framed.next()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn have_out_of_range_is_fatal() {
        let (client, server) = connected_pair().await;
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(32 * 1024));
        let mut session = PeerSession::new(PeerId::new([1u8; 20]), server, info(), storage);
        let handle = tokio::spawn(async move { session.run(&Bitfield::new(2)).await });

        let mut framed = Framed::new(client, MessageCodec);
        let _bitfield = framed.next().await.unwrap().unwrap();
        framed.send(Message::Have(5)).await.unwrap();
        let result = handle.await.unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn duplicate_bitfield_is_fatal() {
        let (client, server) = connected_pair().await;
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(32 * 1024));
        let mut session = PeerSession::new(PeerId::new([1u8; 20]), server, info(), storage);
        let handle = tokio::spawn(async move { session.run(&Bitfield::new(2)).await });

        let mut framed = Framed::new(client, MessageCodec);
        let _bitfield = framed.next().await.unwrap().unwrap();
        framed.send(Message::Bitfield(vec![0u8])).await.unwrap();
        framed.send(Message::Bitfield(vec![0u8])).await.unwrap();
        let result = handle.await.unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn responds_to_request_when_unchoked_with_data() {
        let (client, server) = connected_pair().await;
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(32 * 1024));
        storage.set(0, &[7u8; 16 * 1024]).await;
        let mut session = PeerSession::new(PeerId::new([1u8; 20]), server, info(), storage);
        session.set_am_choking(false);
        tokio::spawn(async move {
            let _ = session.run(&Bitfield::new(2)).await;
        });

        let mut framed = Framed::new(client, MessageCodec);
        let _bitfield = framed.next().await.unwrap().unwrap();
        framed
            .send(Message::Request { index: 0, offset: 0, length: 16 * 1024 })
            .await
            .unwrap();
        let reply = framed.next().await.unwrap().unwrap();
        assert_eq!(reply, Message::Piece { index: 0, offset: 0, block: vec![7u8; 16 * 1024] });
    }
}
