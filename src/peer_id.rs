use rand::RngCore;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId([u8; 20]);

impl PeerId {
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    // prefix must be exactly 8 bytes, padded with 12 random bytes
    pub fn generate(prefix: &[u8]) -> Self {
        assert_eq!(prefix.len(), 8, "peer id prefix must be 8 bytes");
        let mut bytes = [0u8; 20];
        bytes[..8].copy_from_slice(prefix);
        rand::rng().fill_bytes(&mut bytes[8..]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; 20] {
        self.0
    }
}

impl From<[u8; 20]> for PeerId {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_keeps_prefix() {
        let id = PeerId::generate(b"-RT0001-");
        assert_eq!(&id.as_bytes()[..8], b"-RT0001-");
    }

    #[test]
    fn two_generated_ids_differ_in_suffix() {
        let a = PeerId::generate(b"-RT0001-");
        let b = PeerId::generate(b"-RT0001-");
        assert_ne!(a.as_bytes()[8..], b.as_bytes()[8..]);
    }

    #[test]
    fn display_is_hex() {
        let id = PeerId::new(*b"abcdefghijklmnopqrst");
        assert_eq!(id.to_string(), hex::encode(b"abcdefghijklmnopqrst"));
    }
}
