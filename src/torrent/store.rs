use super::StoreError;
use crate::constants::BLOCK_SIZE;
use crate::peer::Bitfield;
use bytes::Bytes;
use parking_lot::Mutex;
use sha1::{Digest, Sha1};

/// Outcome of writing one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// The piece still misses blocks.
    Partial,
    /// The last block of the piece arrived and the piece was hash-checked.
    /// An invalid piece has been discarded and can be downloaded again.
    PieceComplete { valid: bool },
}

/// Persistence and verification of a torrent's pieces.
///
/// Blocks are [`BLOCK_SIZE`] aligned; the last block of a piece may be
/// shorter.
pub trait PieceStore: Send + Sync {
    /// Checks local data; called once while the torrent validates.
    fn initialize(&self) -> Result<(), StoreError>;

    fn piece_count(&self) -> u32;

    /// Length of `index`, which is shorter than the nominal piece length
    /// only for the last piece.
    fn piece_length(&self, index: u32) -> u32;

    fn completed_pieces(&self) -> Bitfield;

    fn mark_completed(&self, index: u32);

    fn is_complete(&self) -> bool {
        self.completed_pieces().is_complete()
    }

    /// Percentage of completed pieces, 0 to 100.
    fn completion(&self) -> f64 {
        let count = self.piece_count();
        if count == 0 {
            return 100.0;
        }
        self.completed_pieces().count() as f64 * 100.0 / count as f64
    }

    /// Bytes still missing.
    fn left(&self) -> u64;

    fn read_block(&self, index: u32, begin: u32, length: u32) -> Result<Bytes, StoreError>;

    fn write_block(&self, index: u32, begin: u32, data: &[u8]) -> Result<BlockOutcome, StoreError>;
}

/// SHA-1 verifying store that keeps the whole torrent in memory.
pub struct MemoryPieceStore {
    piece_length: u32,
    total_length: u64,
    hashes: Vec<[u8; 20]>,
    inner: Mutex<MemoryInner>,
}

struct MemoryInner {
    data: Vec<u8>,
    /// Blocks received per incomplete piece.
    received: Vec<Bitfield>,
    completed: Bitfield,
}

impl MemoryPieceStore {
    /// A store holding `data` in full, as a seeder has it.
    pub fn seeded(data: Vec<u8>, piece_length: u32) -> Self {
        let hashes = match piece_length {
            0 => Vec::new(),
            len => data.chunks(len as usize).map(sha1).collect(),
        };
        Self::with_data(data, piece_length, hashes)
    }

    /// An empty store for a torrent of `total_length` bytes with the given
    /// piece hashes.
    pub fn empty(total_length: u64, piece_length: u32, hashes: Vec<[u8; 20]>) -> Self {
        Self::with_data(vec![0u8; total_length as usize], piece_length, hashes)
    }

    fn with_data(data: Vec<u8>, piece_length: u32, hashes: Vec<[u8; 20]>) -> Self {
        let total_length = data.len() as u64;
        let piece_count = hashes.len();
        let blocks_per_piece = piece_length.div_ceil(BLOCK_SIZE) as usize;
        Self {
            piece_length,
            total_length,
            hashes,
            inner: Mutex::new(MemoryInner {
                data,
                received: vec![Bitfield::new(blocks_per_piece); piece_count],
                completed: Bitfield::new(piece_count),
            }),
        }
    }

    pub fn piece_hashes(&self) -> Vec<[u8; 20]> {
        self.hashes.clone()
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn nominal_piece_length(&self) -> u32 {
        self.piece_length
    }

    /// Copy of the stored bytes.
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().data.clone()
    }

    fn piece_offset(&self, index: u32) -> usize {
        index as usize * self.piece_length as usize
    }

    fn check_block(&self, index: u32, begin: u32, length: u32) -> Result<(), StoreError> {
        if index >= self.piece_count() {
            return Err(StoreError::InvalidPiece(index));
        }
        let end = begin as u64 + length as u64;
        if length == 0 || end > self.piece_length(index) as u64 {
            return Err(StoreError::InvalidBlock {
                index,
                begin,
                length,
            });
        }
        Ok(())
    }

    fn verify(&self, data: &[u8], index: u32) -> bool {
        let start = self.piece_offset(index);
        let end = start + self.piece_length(index) as usize;
        sha1(&data[start..end]) == self.hashes[index as usize]
    }
}

impl PieceStore for MemoryPieceStore {
    fn initialize(&self) -> Result<(), StoreError> {
        let expected = match self.piece_length {
            0 => None,
            len => Some(self.total_length.div_ceil(len as u64)),
        };
        if expected != Some(self.hashes.len() as u64) {
            return Err(StoreError::Initialization(format!(
                "{} piece hashes for {} bytes in {}-byte pieces",
                self.hashes.len(),
                self.total_length,
                self.piece_length
            )));
        }

        let mut inner = self.inner.lock();
        for index in 0..self.piece_count() {
            if self.verify(&inner.data, index) {
                inner.completed.set_piece(index as usize);
            }
        }
        Ok(())
    }

    fn piece_count(&self) -> u32 {
        self.hashes.len() as u32
    }

    fn piece_length(&self, index: u32) -> u32 {
        let start = self.piece_offset(index) as u64;
        self.total_length
            .saturating_sub(start)
            .min(self.piece_length as u64) as u32
    }

    fn completed_pieces(&self) -> Bitfield {
        self.inner.lock().completed.clone()
    }

    fn mark_completed(&self, index: u32) {
        self.inner.lock().completed.set_piece(index as usize);
    }

    fn left(&self) -> u64 {
        let completed = self.completed_pieces();
        (0..self.piece_count())
            .filter(|&i| !completed.has_piece(i as usize))
            .map(|i| self.piece_length(i) as u64)
            .sum()
    }

    fn read_block(&self, index: u32, begin: u32, length: u32) -> Result<Bytes, StoreError> {
        self.check_block(index, begin, length)?;
        let inner = self.inner.lock();
        if !inner.completed.has_piece(index as usize) {
            return Err(StoreError::InvalidPiece(index));
        }
        let start = self.piece_offset(index) + begin as usize;
        Ok(Bytes::copy_from_slice(
            &inner.data[start..start + length as usize],
        ))
    }

    fn write_block(&self, index: u32, begin: u32, data: &[u8]) -> Result<BlockOutcome, StoreError> {
        self.check_block(index, begin, data.len() as u32)?;
        if begin % BLOCK_SIZE != 0 {
            return Err(StoreError::InvalidBlock {
                index,
                begin,
                length: data.len() as u32,
            });
        }

        let mut inner = self.inner.lock();
        if inner.completed.has_piece(index as usize) {
            return Ok(BlockOutcome::Partial);
        }

        let start = self.piece_offset(index) + begin as usize;
        inner.data[start..start + data.len()].copy_from_slice(data);

        let blocks = self.piece_length(index).div_ceil(BLOCK_SIZE) as usize;
        let received = &mut inner.received[index as usize];
        received.set_piece((begin / BLOCK_SIZE) as usize);
        if received.count() < blocks {
            return Ok(BlockOutcome::Partial);
        }

        *received = Bitfield::new(received.piece_count());
        let valid = self.verify(&inner.data, index);
        Ok(BlockOutcome::PieceComplete { valid })
    }
}

fn sha1(data: &[u8]) -> [u8; 20] {
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&Sha1::digest(data));
    hash
}
