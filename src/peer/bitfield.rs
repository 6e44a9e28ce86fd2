use bytes::Bytes;

/// One bit per piece, numbered from the high bit of the first byte.
///
/// Bits past `piece_count` in the last byte are always zero, so the raw bytes
/// can be sent as-is in a bitfield message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bits: Vec<u8>,
    piece_count: usize,
}

impl Bitfield {
    pub fn new(piece_count: usize) -> Self {
        Self {
            bits: vec![0; piece_count.div_ceil(8)],
            piece_count,
        }
    }

    /// Builds a bitfield from a peer's message, padding or truncating to the
    /// torrent's piece count.
    pub fn from_bytes(bytes: &[u8], piece_count: usize) -> Self {
        let mut bits = bytes.to_vec();
        bits.resize(piece_count.div_ceil(8), 0);

        let mut bf = Self { bits, piece_count };
        bf.clear_spare_bits();
        bf
    }

    pub fn full(piece_count: usize) -> Self {
        let mut bf = Self {
            bits: vec![0xFF; piece_count.div_ceil(8)],
            piece_count,
        };
        bf.clear_spare_bits();
        bf
    }

    pub fn has_piece(&self, index: usize) -> bool {
        if index >= self.piece_count {
            return false;
        }
        (self.bits[index / 8] >> (7 - index % 8)) & 1 == 1
    }

    /// Sets the bit for `index`; returns whether it was previously clear.
    pub fn set_piece(&mut self, index: usize) -> bool {
        if index >= self.piece_count {
            return false;
        }
        let was_set = self.has_piece(index);
        self.bits[index / 8] |= 1 << (7 - index % 8);
        !was_set
    }

    pub fn clear_piece(&mut self, index: usize) {
        if index >= self.piece_count {
            return;
        }
        self.bits[index / 8] &= !(1 << (7 - index % 8));
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.count() == self.piece_count
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }

    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.bits)
    }

    /// Indices of set bits, in ascending order.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.piece_count).filter(move |&i| self.has_piece(i))
    }

    /// Whether `self` has any piece that `other` lacks.
    pub fn has_any_missing_from(&self, other: &Bitfield) -> bool {
        self.iter_set().any(|i| !other.has_piece(i))
    }

    fn clear_spare_bits(&mut self) {
        let spare = (self.bits.len() * 8) - self.piece_count;
        if spare > 0 && spare < 8 {
            let last = self.bits.len() - 1;
            self.bits[last] &= 0xFFu8 << spare;
        }
    }
}
