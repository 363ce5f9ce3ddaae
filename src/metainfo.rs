use crate::bencode::{self, Value};
use crate::error::Error;
use sha1::{Digest, Sha1};

pub const BLOCK_SIZE: u64 = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub length: u64,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    SingleFile { length: u64 },
    MultiFile { files: Vec<FileEntry> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoDict {
    pub piece_length: u64,
    pub pieces: Vec<[u8; 20]>,
    pub private: bool,
    pub name: String,
    pub layout: Layout,
}

impl InfoDict {
    pub fn total_length(&self) -> u64 {
        match &self.layout {
            Layout::SingleFile { length } => *length,
            Layout::MultiFile { files } => files.iter().map(|f| f.length).sum(),
        }
    }

    pub fn piece_effective_length(&self, index: usize) -> Result<u64, Error> {
        if index >= self.pieces.len() {
            return Err(Error::ProtocolViolation(format!(
                "piece index {index} out of range ({} pieces)",
                self.pieces.len()
            )));
        }
        if index < self.pieces.len() - 1 {
            return Ok(self.piece_length);
        }
        let remainder = self.total_length() % self.piece_length;
        Ok(if remainder == 0 {
            self.piece_length
        } else {
            remainder
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metainfo {
    pub announce: String,
    pub comment: Option<String>,
    pub creation_date: Option<i64>,
    pub created_by: Option<String>,
    pub encoding: Option<String>,
    pub info: InfoDict,
    // sha1 of the bencoded info dict, the swarm identity
    pub info_hash: [u8; 20],
}

fn parse_file_entry(value: &Value) -> Result<FileEntry, Error> {
    let length = value.require("length")?.as_int()? as u64;
    let path_items = value.require("path")?.as_list()?;
    if path_items.is_empty() {
        return Err(Error::MalformedTorrent("file path must be non-empty".into()));
    }
    let path = path_items
        .iter()
        .map(|v| v.as_str().map(str::to_owned))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FileEntry { length, path })
}

fn parse_info(value: &Value) -> Result<InfoDict, Error> {
    let dict = value.as_dict()?;
    let piece_length = value
        .require("piece length")?
        .as_int()
        .map_err(|_| Error::MalformedTorrent("piece length must be an integer".into()))?;
    if piece_length <= 0 {
        return Err(Error::MalformedTorrent("piece length must be positive".into()));
    }
    let piece_length = piece_length as u64;

    let pieces_bytes = value.require("pieces")?.as_bytes()?;
    if pieces_bytes.len() % 20 != 0 {
        return Err(Error::MalformedTorrent(
            "pieces field length is not a multiple of 20".into(),
        ));
    }
    let pieces = pieces_bytes
        .chunks_exact(20)
        .map(|chunk| chunk.try_into().expect("chunk is exactly 20 bytes"))
        .collect::<Vec<[u8; 20]>>();

    let private = match value.get("private") {
        Some(v) => v.as_int()? != 0,
        None => false,
    };

    let name = value.require("name")?.as_str()?.to_owned();

    let has_length = dict.contains_key(b"length".as_slice());
    let has_files = dict.contains_key(b"files".as_slice());
    let layout = match (has_length, has_files) {
        (true, false) => {
            let length = value.require("length")?.as_int()? as u64;
            Layout::SingleFile { length }
        }
        (false, true) => {
            let files = value
                .require("files")?
                .as_list()?
                .iter()
                .map(parse_file_entry)
                .collect::<Result<Vec<_>, _>>()?;
            if files.is_empty() {
                return Err(Error::MalformedTorrent("files list must be non-empty".into()));
            }
            Layout::MultiFile { files }
        }
        (true, true) => {
            return Err(Error::MalformedTorrent(
                "info dict has both `length` and `files`".into(),
            ));
        }
        (false, false) => {
            return Err(Error::MalformedTorrent(
                "info dict has neither `length` nor `files`".into(),
            ));
        }
    };

    let info = InfoDict {
        piece_length,
        pieces,
        private,
        name,
        layout,
    };

    if info.total_length() > 0 && info.piece_length == 0 {
        return Err(Error::MalformedTorrent("piece length must be nonzero".into()));
    }

    Ok(info)
}

pub fn parse_metainfo(bytes: &[u8]) -> Result<Metainfo, Error> {
    let value = bencode::decode(bytes).map_err(|e| Error::MalformedTorrent(e.to_string()))?;
    let announce = value.require("announce")?.as_str()?.to_owned();
    let comment = value.get("comment").and_then(|v| v.as_str().ok()).map(str::to_owned);
    let creation_date = value.get("creation date").and_then(|v| v.as_int().ok());
    let created_by = value.get("created by").and_then(|v| v.as_str().ok()).map(str::to_owned);
    let encoding = value.get("encoding").and_then(|v| v.as_str().ok()).map(str::to_owned);

    let info_value = value.require("info")?;
    let info = parse_info(info_value)?;
    let info_hash = {
        let encoded = bencode::encode(info_value);
        let digest = Sha1::digest(&encoded);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest);
        out
    };

    Ok(Metainfo {
        announce,
        comment,
        creation_date,
        created_by,
        encoding,
        info,
        info_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn single_file_torrent_bytes() -> Vec<u8> {
        let mut info = BTreeMap::new();
        info.insert(b"piece length".to_vec(), Value::Int(16384));
        info.insert(b"pieces".to_vec(), Value::Bytes(vec![0u8; 20]));
        info.insert(b"name".to_vec(), Value::string("file.txt"));
        info.insert(b"length".to_vec(), Value::Int(100));

        let mut top = BTreeMap::new();
        top.insert(b"announce".to_vec(), Value::string("http://tracker.example/announce"));
        top.insert(b"info".to_vec(), Value::Dict(info));

        bencode::encode(&Value::Dict(top))
    }

    #[test]
    fn parses_single_file_torrent() {
        let meta = parse_metainfo(&single_file_torrent_bytes()).unwrap();
        assert_eq!(meta.announce, "http://tracker.example/announce");
        assert_eq!(meta.info.name, "file.txt");
        assert!(!meta.info.private);
        assert_eq!(meta.info.total_length(), 100);
        assert!(matches!(meta.info.layout, Layout::SingleFile { length: 100 }));
    }

    #[test]
    fn info_hash_is_deterministic() {
        let bytes = single_file_torrent_bytes();
        let first = parse_metainfo(&bytes).unwrap().info_hash;
        let second = parse_metainfo(&bytes).unwrap().info_hash;
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_both_length_and_files() {
        let mut info = BTreeMap::new();
        info.insert(b"piece length".to_vec(), Value::Int(16384));
        info.insert(b"pieces".to_vec(), Value::Bytes(vec![0u8; 20]));
        info.insert(b"name".to_vec(), Value::string("x"));
        info.insert(b"length".to_vec(), Value::Int(1));
        info.insert(b"files".to_vec(), Value::List(vec![]));
        let mut top = BTreeMap::new();
        top.insert(b"announce".to_vec(), Value::string("http://t"));
        top.insert(b"info".to_vec(), Value::Dict(info));
        assert!(parse_metainfo(&bencode::encode(&Value::Dict(top))).is_err());
    }

    #[test]
    fn rejects_pieces_length_not_multiple_of_20() {
        let mut info = BTreeMap::new();
        info.insert(b"piece length".to_vec(), Value::Int(16384));
        info.insert(b"pieces".to_vec(), Value::Bytes(vec![0u8; 19]));
        info.insert(b"name".to_vec(), Value::string("x"));
        info.insert(b"length".to_vec(), Value::Int(1));
        let mut top = BTreeMap::new();
        top.insert(b"announce".to_vec(), Value::string("http://t"));
        top.insert(b"info".to_vec(), Value::Dict(info));
        assert!(parse_metainfo(&bencode::encode(&Value::Dict(top))).is_err());
    }

    #[test]
    fn private_defaults_to_false() {
        let meta = parse_metainfo(&single_file_torrent_bytes()).unwrap();
        assert!(!meta.info.private);
    }

    #[test]
    fn last_piece_is_the_remainder() {
        let mut info = BTreeMap::new();
        info.insert(b"piece length".to_vec(), Value::Int(10));
        info.insert(b"pieces".to_vec(), Value::Bytes(vec![0u8; 40]));
        info.insert(b"name".to_vec(), Value::string("x"));
        info.insert(b"length".to_vec(), Value::Int(25));
        let mut top = BTreeMap::new();
        top.insert(b"announce".to_vec(), Value::string("http://t"));
        top.insert(b"info".to_vec(), Value::Dict(info));
        let meta = parse_metainfo(&bencode::encode(&Value::Dict(top))).unwrap();
        assert_eq!(meta.info.piece_effective_length(0).unwrap(), 10);
        assert_eq!(meta.info.piece_effective_length(1).unwrap(), 10);
        assert_eq!(meta.info.piece_effective_length(2).unwrap(), 5);
    }
}
