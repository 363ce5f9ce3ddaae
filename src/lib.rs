pub mod bencode;
pub mod bitfield;
pub mod client;
pub mod error;
pub mod metainfo;
pub mod nat;
pub mod peer;
pub mod peer_id;
pub mod piece;
pub mod storage;
pub mod torrent;
pub mod tracker_client;
pub mod util;

pub use error::Error;
