use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed bencode: {0}")]
    BadBencode(String),

    #[error("malformed torrent: {0}")]
    MalformedTorrent(String),

    #[error("invalid block (index={index}, offset={offset}, length={length}): {reason}")]
    InvalidBlock {
        index: u32,
        offset: u32,
        length: u32,
        reason: String,
    },

    #[error("handshake mismatch: {0}")]
    HandshakeMismatch(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("unexpected end of stream")]
    UnexpectedEof,

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("tracker rejected request: {0}")]
    TrackerRejected(String),

    #[error("unsupported tracker scheme: {0}")]
    TrackerUnsupportedScheme(String),

    #[error("storage operation failed: {0}")]
    StorageFailure(String),

    #[error("bad url: {0}")]
    BadUrl(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
