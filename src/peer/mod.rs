pub mod handshake;
pub mod message;
pub mod session;

pub use handshake::Handshake;
pub use message::{Message, MessageCodec};
pub use session::{PeerSession, PeerState, Sender};
