use crate::error::Error;
use crate::peer_id::PeerId;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const PSTR: &[u8; 19] = b"BitTorrent protocol";

/// The 68-byte handshake: `0x13 || pstr || 8 reserved bytes || infoHash || peerId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: PeerId,
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: PeerId) -> Self {
        Self { info_hash, peer_id }
    }

    fn to_bytes(self) -> [u8; 68] {
        let mut out = [0u8; 68];
        out[0] = 19;
        out[1..20].copy_from_slice(PSTR);
        out[28..48].copy_from_slice(&self.info_hash);
        out[48..68].copy_from_slice(self.peer_id.as_bytes());
        out
    }

    fn from_bytes(buf: [u8; 68]) -> Result<Self, Error> {
        if buf[0] != 19 {
            return Err(Error::HandshakeMismatch(format!(
                "pstrlen {} is not 19",
                buf[0]
            )));
        }
        if &buf[1..20] != PSTR {
            return Err(Error::HandshakeMismatch("pstr is not BitTorrent protocol".into()));
        }
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&buf[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&buf[48..68]);
        Ok(Self {
            info_hash,
            peer_id: PeerId::new(peer_id),
        })
    }

    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), Error> {
        writer.write_all(&self.to_bytes()).await?;
        Ok(())
    }

    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, Error> {
        let mut buf = [0u8; 68];
        reader
            .read_exact(&mut buf)
            .await
            .map_err(|_| Error::UnexpectedEof)?;
        Self::from_bytes(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_a_buffer() {
        let handshake = Handshake::new(*b"aaaaaaaaaaaaaaaaaaaa", PeerId::new(*b"bbbbbbbbbbbbbbbbbbbb"));
        let mut buf = Vec::new();
        handshake.write(&mut buf).await.unwrap();
        assert_eq!(buf.len(), 68);
        let mut cursor = std::io::Cursor::new(buf);
        let read_back = Handshake::read(&mut cursor).await.unwrap();
        assert_eq!(read_back, handshake);
    }

    #[tokio::test]
    async fn rejects_wrong_pstrlen() {
        let mut buf = [0u8; 68];
        buf[0] = 20;
        buf[1..20].copy_from_slice(PSTR);
        let mut cursor = std::io::Cursor::new(buf);
        assert!(Handshake::read(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn rejects_wrong_pstr() {
        let mut buf = [0u8; 68];
        buf[0] = 19;
        buf[1..20].copy_from_slice(b"not bittorrent prot");
        let mut cursor = std::io::Cursor::new(buf);
        assert!(Handshake::read(&mut cursor).await.is_err());
    }
}
