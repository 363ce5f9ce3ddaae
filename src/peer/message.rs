use crate::error::Error;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const MAX_LEN: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(u32),
    Bitfield(Vec<u8>),
    Request { index: u32, offset: u32, length: u32 },
    Piece { index: u32, offset: u32, block: Vec<u8> },
    Cancel { index: u32, offset: u32, length: u32 },
}

impl Message {
    fn id(&self) -> u8 {
        match self {
            Message::Choke => 0,
            Message::Unchoke => 1,
            Message::Interested => 2,
            Message::NotInterested => 3,
            Message::Have(_) => 4,
            Message::Bitfield(_) => 5,
            Message::Request { .. } => 6,
            Message::Piece { .. } => 7,
            Message::Cancel { .. } => 8,
        }
    }
}

// u32 length || u8 id || body framing. keep-alives (length 0) and unknown
// ids are drained and we recurse onto the next frame instead of erroring.
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let mut length_bytes = [0u8; 4];
        length_bytes.copy_from_slice(&src[..4]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        if length == 0 {
            src.advance(4);
            return self.decode(src);
        }
        if length > MAX_LEN {
            return Err(Error::ProtocolViolation(format!(
                "frame of length {length} exceeds {MAX_LEN}"
            )));
        }
        if src.len() < 4 + length {
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        let id = src[4];
        let body = &src[5..4 + length];
        let body_len = length - 1;

        let message = match id {
            0 if body_len == 0 => Message::Choke,
            1 if body_len == 0 => Message::Unchoke,
            2 if body_len == 0 => Message::Interested,
            3 if body_len == 0 => Message::NotInterested,
            4 if body_len == 4 => Message::Have(u32::from_be_bytes(body.try_into().unwrap())),
            5 => Message::Bitfield(body.to_vec()),
            6 if body_len == 12 => Message::Request {
                index: u32::from_be_bytes(body[0..4].try_into().unwrap()),
                offset: u32::from_be_bytes(body[4..8].try_into().unwrap()),
                length: u32::from_be_bytes(body[8..12].try_into().unwrap()),
            },
            7 if body_len >= 8 => Message::Piece {
                index: u32::from_be_bytes(body[0..4].try_into().unwrap()),
                offset: u32::from_be_bytes(body[4..8].try_into().unwrap()),
                block: body[8..].to_vec(),
            },
            8 if body_len == 12 => Message::Cancel {
                index: u32::from_be_bytes(body[0..4].try_into().unwrap()),
                offset: u32::from_be_bytes(body[4..8].try_into().unwrap()),
                length: u32::from_be_bytes(body[8..12].try_into().unwrap()),
            },
            0..=8 => {
                return Err(Error::ProtocolViolation(format!(
                    "message id {id} has inconsistent length {length}"
                )));
            }
            unknown => {
                tracing::debug!(id = unknown, length, "draining unknown message id");
                src.advance(4 + length);
                return self.decode(src);
            }
        };
        src.advance(4 + length);
        Ok(Some(message))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body_len = match &item {
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => 0,
            Message::Have(_) => 4,
            Message::Bitfield(b) => b.len(),
            Message::Request { .. } | Message::Cancel { .. } => 12,
            Message::Piece { block, .. } => 8 + block.len(),
        };
        if body_len + 1 > MAX_LEN {
            return Err(Error::ProtocolViolation(format!(
                "outgoing frame of length {} exceeds {MAX_LEN}",
                body_len + 1
            )));
        }

        dst.reserve(4 + 1 + body_len);
        dst.put_u32((body_len + 1) as u32);
        dst.put_u8(item.id());
        match item {
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => {}
            Message::Have(index) => dst.put_u32(index),
            Message::Bitfield(bytes) => dst.extend_from_slice(&bytes),
            Message::Request { index, offset, length } | Message::Cancel { index, offset, length } => {
                dst.put_u32(index);
                dst.put_u32(offset);
                dst.put_u32(length);
            }
            Message::Piece { index, offset, block } => {
                dst.put_u32(index);
                dst.put_u32(offset);
                dst.extend_from_slice(&block);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: Message) -> Message {
        let mut codec = MessageCodec;
        let mut buf = BytesMut::new();
        codec.encode(msg, &mut buf).unwrap();
        codec.decode(&mut buf).unwrap().unwrap()
    }

    #[test]
    fn round_trips_fixed_messages() {
        assert_eq!(round_trip(Message::Choke), Message::Choke);
        assert_eq!(round_trip(Message::Interested), Message::Interested);
        assert_eq!(round_trip(Message::Have(7)), Message::Have(7));
    }

    #[test]
    fn round_trips_request_and_piece() {
        let request = Message::Request { index: 1, offset: 2, length: 3 };
        assert_eq!(round_trip(request.clone()), request);
        let piece = Message::Piece { index: 1, offset: 0, block: vec![1, 2, 3] };
        assert_eq!(round_trip(piece.clone()), piece);
    }

    #[test]
    fn keep_alive_is_swallowed() {
        let mut codec = MessageCodec;
        let mut buf = BytesMut::new();
        buf.put_u32(0); // keep-alive
        buf.put_u32(1);
        buf.put_u8(1); // unchoke
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Message::Unchoke));
    }

    #[test]
    fn unknown_id_is_drained_not_fatal() {
        let mut codec = MessageCodec;
        let mut buf = BytesMut::new();
        buf.put_u32(3);
        buf.put_u8(99);
        buf.extend_from_slice(&[0, 0]);
        buf.put_u32(1);
        buf.put_u8(0); // choke
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Message::Choke));
    }

    #[test]
    fn wrong_length_for_known_id_is_fatal() {
        let mut codec = MessageCodec;
        let mut buf = BytesMut::new();
        buf.put_u32(2);
        buf.put_u8(0); // choke should be len=1
        buf.put_u8(0);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn incomplete_frame_returns_none() {
        let mut codec = MessageCodec;
        let mut buf = BytesMut::new();
        buf.put_u32(5);
        buf.put_u8(4);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }
}
