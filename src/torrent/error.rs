use super::TorrentState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("piece index {0} out of range")]
    InvalidPiece(u32),

    #[error("invalid block: piece {index}, offset {begin}, length {length}")]
    InvalidBlock { index: u32, begin: u32, length: u32 },

    #[error("initialization failed: {0}")]
    Initialization(String),
}

#[derive(Debug, Error)]
pub enum TorrentError {
    /// The operation is not allowed in the torrent's current state.
    #[error("invalid state {state} for {operation}")]
    InvalidState {
        state: TorrentState,
        operation: &'static str,
    },

    #[error("peer referenced piece {0}, which is out of range or unavailable")]
    InvalidPiece(u32),

    #[error("block length {0} exceeds the frame limit")]
    BlockTooLarge(u32),

    #[error("invalid info hash: {0}")]
    InvalidInfoHash(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
