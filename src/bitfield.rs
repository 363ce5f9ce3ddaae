use crate::error::Error;

// bit 0 is the MSB of byte 0, per the bitfield message wire convention
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bytes: Vec<u8>,
    n_bits: usize,
}

impl Bitfield {
    pub fn new(n_bits: usize) -> Self {
        let len = n_bits.div_ceil(8);
        Self {
            bytes: vec![0u8; len],
            n_bits,
        }
    }

    pub fn from_payload(data: Vec<u8>, n_bits: usize) -> Result<Self, Error> {
        if data.len() != n_bits.div_ceil(8) {
            return Err(Error::ProtocolViolation(format!(
                "bitfield length {} does not match {n_bits} pieces",
                data.len()
            )));
        }
        let bf = Self { bytes: data, n_bits };
        if bf.pieces().any(|i| i >= n_bits) {
            return Err(Error::ProtocolViolation("bitfield sets spare bits".into()));
        }
        Ok(bf)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.n_bits
    }

    pub fn is_empty(&self) -> bool {
        self.n_bits == 0
    }

    pub fn set_piece(&mut self, piece_i: usize) -> Result<(), Error> {
        if piece_i >= self.n_bits {
            return Err(Error::ProtocolViolation(format!(
                "piece index {piece_i} out of range ({} pieces)",
                self.n_bits
            )));
        }
        let byte_i = piece_i / 8;
        let bit_i = piece_i % 8;
        self.bytes[byte_i] |= 0b1000_0000 >> bit_i;
        Ok(())
    }

    pub fn has_piece(&self, piece_i: usize) -> bool {
        let byte_i = piece_i / 8;
        let bit_i = piece_i % 8;
        let Some(byte) = self.bytes.get(byte_i) else {
            return false;
        };
        byte & (0b1000_0000 >> bit_i) != 0
    }

    pub fn is_complete(&self) -> bool {
        self.pieces().count() == self.n_bits
    }

    pub fn pieces(&self) -> impl Iterator<Item = usize> + '_ {
        let n_bits = self.n_bits;
        self.bytes.iter().enumerate().flat_map(move |(byte_i, byte)| {
            (0..8).filter_map(move |bit_i| {
                let piece_i = byte_i * 8 + bit_i;
                if piece_i >= n_bits {
                    return None;
                }
                let mask = 0b1000_0000 >> bit_i;
                (byte & mask != 0).then_some(piece_i)
            })
        })
    }

    pub fn no_pieces(&self) -> impl Iterator<Item = usize> + '_ {
        let n_bits = self.n_bits;
        self.bytes.iter().enumerate().flat_map(move |(byte_i, byte)| {
            (0..8).filter_map(move |bit_i| {
                let piece_i = byte_i * 8 + bit_i;
                if piece_i >= n_bits {
                    return None;
                }
                let mask = 0b1000_0000 >> bit_i;
                (byte & mask == 0).then_some(piece_i)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_piece_then_has_piece() {
        let mut bf = Bitfield::new(35);
        bf.set_piece(34).unwrap();
        assert!(bf.has_piece(34));
        assert!(!bf.has_piece(33));
    }

    #[test]
    fn set_piece_out_of_range_errors() {
        let mut bf = Bitfield::new(10);
        assert!(bf.set_piece(10).is_err());
    }

    #[test]
    fn has_piece_matches_msb_first_convention() {
        let bf = Bitfield::from_payload(vec![0b10101010, 0b01110110], 16).unwrap();
        assert!(bf.has_piece(0));
        assert!(!bf.has_piece(1));
        assert!(!bf.has_piece(7));
        assert!(!bf.has_piece(8));
        assert!(bf.has_piece(14));
    }

    #[test]
    fn pieces_iterates_set_bits_in_order() {
        let bf = Bitfield::from_payload(vec![0b10101010, 0b01110110], 16).unwrap();
        let pieces: Vec<usize> = bf.pieces().collect();
        assert_eq!(pieces, vec![0, 2, 4, 6, 9, 10, 11, 13, 14]);
    }

    #[test]
    fn no_pieces_stops_at_bit_count() {
        let bf = Bitfield::new(3);
        let no_pieces: Vec<usize> = bf.no_pieces().collect();
        assert_eq!(no_pieces, vec![0, 1, 2]);
    }

    #[test]
    fn from_payload_rejects_wrong_length() {
        assert!(Bitfield::from_payload(vec![0u8; 1], 20).is_err());
    }

    #[test]
    fn from_payload_rejects_spare_bits_set() {
        // 3 pieces need 1 byte; bit 4 is a spare bit beyond n_bits
        assert!(Bitfield::from_payload(vec![0b0000_1000], 3).is_err());
    }

    #[test]
    fn is_complete_true_only_when_all_bits_set() {
        let mut bf = Bitfield::new(2);
        assert!(!bf.is_complete());
        bf.set_piece(0).unwrap();
        bf.set_piece(1).unwrap();
        assert!(bf.is_complete());
    }
}
